pub mod analyze;
pub mod batch;
pub mod config;
pub mod history;
pub mod scan;

pub use analyze::*;
pub use batch::*;
pub use config::*;
pub use history::*;
pub use scan::*;
