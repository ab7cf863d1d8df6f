//! Storage layout configuration

use std::path::{Path, PathBuf};

use crate::filesys::File;

/// Storage layout for fleethand state
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all local state
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the server database path
    pub fn db_path(&self) -> PathBuf {
        self.base_dir.join("fleet.db")
    }

    /// Resolve a roster file path. Absolute paths pass through; relative
    /// paths are looked up inside the base directory.
    pub fn roster_path(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(name)
        }
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let base_dir = match std::env::var_os("FLEETHAND_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".fleethand"),
        };
        Self::new(base_dir)
    }
}

// Add dirs crate functionality inline for cross-platform support
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
