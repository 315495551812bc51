//! Local user settings.
//!
//! Two flags kept in a small JSON file in the data directory. They never
//! leave the machine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// User settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Use the dark theme.
    pub dark_mode: bool,
    /// Show notifications.
    pub notifications_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            notifications_enabled: true,
        }
    }
}

/// File-backed settings storage.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Create a store for the settings file at `path`. Nothing is read yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the path to the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings. A missing or empty file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or isn't valid JSON.
    pub fn load(&self) -> Result<Settings> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Settings::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save settings, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, contents)?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }

    /// Set the dark mode flag, returning the updated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings can't be loaded or saved.
    pub fn set_dark_mode(&self, enabled: bool) -> Result<Settings> {
        self.update(|settings| settings.dark_mode = enabled)
    }

    /// Set the notifications flag, returning the updated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings can't be loaded or saved.
    pub fn set_notifications_enabled(&self, enabled: bool) -> Result<Settings> {
        self.update(|settings| settings.notifications_enabled = enabled)
    }

    fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<Settings> {
        let mut settings = self.load()?;
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::generate_id;

    fn temp_store() -> (SettingsStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("bistro-settings-{}", generate_id(12)));
        (SettingsStore::new(dir.join("settings.json")), dir)
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.dark_mode);
        assert!(settings.notifications_enabled);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (store, _) = temp_store();
        assert_eq!(store.load().unwrap(), Settings::default());
    }

    #[test]
    fn test_round_trip_through_file() {
        let (store, dir) = temp_store();

        let updated = store.set_dark_mode(true).unwrap();
        assert!(updated.dark_mode);
        let updated = store.set_notifications_enabled(false).unwrap();
        assert!(updated.dark_mode);
        assert!(!updated.notifications_enabled);

        let reloaded = SettingsStore::new(store.path()).load().unwrap();
        assert_eq!(reloaded, updated);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_and_partial_files() {
        let (store, dir) = temp_store();
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.load().unwrap(), Settings::default());

        std::fs::write(store.path(), r#"{"dark_mode": true}"#).unwrap();
        let settings = store.load().unwrap();
        assert!(settings.dark_mode);
        assert!(settings.notifications_enabled);

        std::fs::write(store.path(), "not json").unwrap();
        assert!(store.load().is_err());

        let _ = std::fs::remove_dir_all(dir);
    }
}
