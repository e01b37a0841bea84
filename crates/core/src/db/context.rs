use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::db::{load_config, open_crash_db, AnalyzerConfig, CrashDb, DataLayout};

/// A data directory opened for history work: its layout, the effective
/// config, and the crash database that config points at.
#[derive(Debug)]
pub struct AnalyzerContext {
    pub layout: DataLayout,
    pub config: AnalyzerConfig,
    pub db_path: PathBuf,
    pub db: CrashDb,
}

impl AnalyzerContext {
    /// Open the crash database named by an already loaded config.
    pub fn open(layout: DataLayout, config: AnalyzerConfig) -> Result<Self> {
        let (db_path, db) = open_crash_db(&layout, &config)?;
        Ok(Self { layout, config, db_path, db })
    }

    /// Load the effective config under `root` and open its database.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = DataLayout::new(root);
        let config = load_config(&layout)?;
        Self::open(layout, config)
    }
}
