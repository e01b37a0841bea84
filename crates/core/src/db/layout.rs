use std::path::{Path, PathBuf};

/// Name of the per-user data directory under the home directory.
pub const DATA_DIR_NAME: &str = ".bsod_analyzer";

/// Logical layout of the analyzer's data directory.
///
/// Derived from a chosen root path. It does *not* perform any IO itself; the
/// CLI creates directories as needed.
#[derive(Debug, Clone)]
pub struct DataLayout {
    /// Root of the data directory.
    pub root: PathBuf,
    /// Path to the config file (JSON).
    pub config_path: PathBuf,
    /// Default path of the crash history database.
    pub db_path: PathBuf,
    /// Directory where users can drop dumps to be picked up by `scan`.
    pub dumps_dir: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let config_path = root.join("config.json");
        let db_path = root.join("crashes.db");
        let dumps_dir = root.join("dumps");
        Self { root, config_path, db_path, dumps_dir }
    }

    /// Layout rooted at `~/.bsod_analyzer`, or `None` without a home directory.
    pub fn default_for_user() -> Option<Self> {
        home::home_dir().map(|home| Self::new(home.join(DATA_DIR_NAME)))
    }

    /// Resolve a configured path: absolute paths pass through, relative ones
    /// are joined onto the data root.
    pub fn resolve(&self, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
