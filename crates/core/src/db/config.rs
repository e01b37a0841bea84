use serde::{Deserialize, Serialize};

use crate::analysis::MAX_STACK_FRAMES;

fn default_database_path() -> String {
    "crashes.db".to_string()
}

fn default_dump_dir() -> String {
    "C:/Windows/Minidump".to_string()
}

fn default_max_stack_frames() -> usize {
    MAX_STACK_FRAMES
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Serializable analyzer settings.
///
/// Lives at `config.json` in the data directory. Every field has a default so
/// a partial file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Config format version, not the tool version.
    #[serde(default = "AnalyzerConfig::current_version")]
    pub config_version: String,
    /// Crash database file, relative to the data directory unless absolute.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Directory scanned first when looking for dumps.
    #[serde(default = "default_dump_dir")]
    pub default_dump_dir: String,
    /// Per-thread frame limit (capped at 50 by the walker).
    #[serde(default = "default_max_stack_frames")]
    pub max_stack_frames: usize,
    /// Results below this confidence are flagged as low confidence in reports.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Optional JSON file extending the known-bad driver table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_bad_drivers_file: Option<String>,
}

impl AnalyzerConfig {
    fn current_version() -> String {
        "0.1.0".to_string()
    }

    pub fn new() -> Self {
        Self {
            config_version: Self::current_version(),
            database_path: default_database_path(),
            default_dump_dir: default_dump_dir(),
            max_stack_frames: default_max_stack_frames(),
            confidence_threshold: default_confidence_threshold(),
            log_level: default_log_level(),
            known_bad_drivers_file: None,
        }
    }

    /// Apply `BSOD_ANALYZER_*` overrides from an environment lookup.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("BSOD_ANALYZER_DB") {
            self.database_path = path;
        }
        if let Some(level) = lookup("BSOD_ANALYZER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(frames) = lookup("BSOD_ANALYZER_MAX_FRAMES").and_then(|v| v.parse().ok()) {
            self.max_stack_frames = frames;
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self::new()
    }
}
