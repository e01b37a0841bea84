//! Crash history persistence and the analyzer's on-disk configuration.
//!
//! - `AnalyzerConfig`: serializable settings stored as `config.json`.
//! - `DataLayout`: computed paths of the data directory.
//! - `CrashDb`: a small SQLite wrapper with versioned schema migrations.
//! - `AnalyzerContext`: layout + config + open database in one value.

pub mod config;
pub mod context;
pub mod crash_db;
pub mod layout;
pub mod models;
pub mod util;

pub use config::AnalyzerConfig;
pub use context::AnalyzerContext;
pub use crash_db::{format_timestamp, CrashDb, DbError, DbResult, CURRENT_SCHEMA_VERSION};
pub use layout::{DataLayout, DATA_DIR_NAME};
pub use models::{CrashHistoryRecord, CrashStatistics};
pub use util::{load_config, load_config_file, open_crash_db, save_config};
