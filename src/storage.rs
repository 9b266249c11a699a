use std::fs;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use log::warn;

/// Storage key for the serialized chat list.
pub const CHATS_KEY: &str = "chats";
/// Storage key for the serialized settings.
pub const SETTINGS_KEY: &str = "settings";
/// Storage key for the theme preference ("dark" or "light").
pub const THEME_KEY: &str = "theme";

/// Flat key-value storage backed by one file per key under the user
/// config directory.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn open() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(Self {
            root: config_dir.join("kanish-chat"),
        })
    }

    /// Storage rooted at an explicit directory. Used by tests.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the stored value for `key`, or `None` if it was never
    /// written or cannot be read. Corrupted or missing entries are
    /// treated the same so callers fall back to defaults.
    pub fn get(&self, key: &str) -> Option<String> {
        let path = self.root.join(key);
        match fs::read_to_string(&path) {
            Ok(value) => Some(value),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!("failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(key), value)?;
        Ok(())
    }

    /// Path of the log file kept alongside the stored entries.
    pub fn log_path(&self) -> PathBuf {
        self.root.join("kanish.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_for_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        assert_eq!(storage.get("chats"), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        storage.set("theme", "dark").unwrap();
        assert_eq!(storage.get("theme").as_deref(), Some("dark"));
    }

    #[test]
    fn set_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().join("nested").join("root"));
        storage.set("settings", "{}").unwrap();
        assert_eq!(storage.get("settings").as_deref(), Some("{}"));
    }
}
