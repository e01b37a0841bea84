//! Address resolution and stack recovery.
//!
//! - [`ModuleIndex`]: maps a virtual address to the loaded module covering it.
//! - [`StackWalker`]: turns captured thread stacks into module-resolved frames.

pub mod module_index;
pub mod stack_walker;

pub use module_index::ModuleIndex;
pub use stack_walker::{StackWalker, ThreadStack, MAX_STACK_FRAMES};
