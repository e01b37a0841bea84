//! Higher-level services built on top of the decoders and knowledge tables.

pub mod attribution;
pub mod pipeline;

pub use attribution::{attribute, Attribution, SuspectSource, COMMON_DRIVER_BUGCHECKS};
pub use pipeline::{
    crash_patterns, decode_file, BatchOutcome, CrashAnalyzer, CrashPatterns, DecodedDump,
};
