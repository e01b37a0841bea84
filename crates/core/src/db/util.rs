use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::db::{AnalyzerConfig, CrashDb, DataLayout};

/// Load the config JSON for a layout as stored; a missing file yields defaults.
pub fn load_config_file(layout: &DataLayout) -> Result<AnalyzerConfig> {
    if !layout.config_path.exists() {
        return Ok(AnalyzerConfig::default());
    }
    let config_json = fs::read_to_string(&layout.config_path)
        .with_context(|| format!("Failed to read config at {}", layout.config_path.display()))?;
    serde_json::from_str(&config_json).context("Failed to parse config JSON")
}

/// Effective configuration: the stored file with `BSOD_ANALYZER_*`
/// environment overrides applied on top.
pub fn load_config(layout: &DataLayout) -> Result<AnalyzerConfig> {
    let mut config = load_config_file(layout)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

/// Write the config JSON for a layout, creating the data directory if needed.
pub fn save_config(layout: &DataLayout, config: &AnalyzerConfig) -> Result<()> {
    fs::create_dir_all(&layout.root)
        .with_context(|| format!("Failed to create data directory {}", layout.root.display()))?;
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(&layout.config_path, json)
        .with_context(|| format!("Failed to write config at {}", layout.config_path.display()))?;
    Ok(())
}

/// Resolve the DB path (respecting relative/absolute config) and open a CrashDb.
pub fn open_crash_db(layout: &DataLayout, config: &AnalyzerConfig) -> Result<(PathBuf, CrashDb)> {
    let db_path = layout.resolve(&config.database_path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let db = CrashDb::open(&db_path)
        .with_context(|| format!("Failed to open crash database at {}", db_path.display()))?;
    Ok((db_path, db))
}
