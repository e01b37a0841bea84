use std::env;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use bsod_core::db::{AnalyzerConfig, DataLayout};
use bsod_core::knowledge::DriverDetector;
use sha2::{Digest, Sha256};
use tracing_subscriber::{fmt, EnvFilter};

pub mod commands;

pub use commands::*;

/// Canonicalize a path if possible, falling back to joining it onto the
/// current working directory.
pub fn canonicalize_or_current(root: &str) -> Result<PathBuf> {
    let path = Path::new(root);
    if path == Path::new(".") {
        Ok(env::current_dir().context("Failed to get current directory")?)
    } else {
        match path.canonicalize() {
            Ok(p) => Ok(p),
            Err(_) => {
                let cwd = env::current_dir().context("Failed to get current directory")?;
                Ok(cwd.join(path))
            }
        }
    }
}

/// Pick the data directory: an explicit `--data-dir`, else `~/.bsod_analyzer`.
pub fn resolve_layout(data_dir: Option<&str>) -> Result<DataLayout> {
    match data_dir {
        Some(dir) => Ok(DataLayout::new(canonicalize_or_current(dir)?)),
        None => DataLayout::default_for_user()
            .ok_or_else(|| anyhow!("Could not determine home directory; pass --data-dir")),
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` means `debug` and the
/// configured level applies. Output goes to stderr.
pub fn init_logging(config_level: &str, verbose: bool) {
    let fallback = if verbose { "debug" } else { config_level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::try_new(fallback).unwrap_or_else(|_| EnvFilter::new("info")));
    // A subscriber may already be installed (e.g. by a test harness).
    let _ = fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).try_init();
}

/// Build the driver table, merging the configured extension file if any.
pub fn load_driver_detector(layout: &DataLayout, config: &AnalyzerConfig) -> Result<DriverDetector> {
    match &config.known_bad_drivers_file {
        Some(file) => DriverDetector::with_extension_file(&layout.resolve(file)),
        None => Ok(DriverDetector::new()),
    }
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open dump for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read dump for hashing: {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher.finalize();
    Ok(format!("{:x}", digest))
}
