//! Settings file storage (camelCase JSON)

use crate::error::AcquireError;
use emufetch_types::Settings;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Reads and writes the settings file at a fixed path
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/emufetch/settings.json`, falling back to the working directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("emufetch"))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing file yields the defaults
    pub async fn load(&self) -> Result<Settings, AcquireError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", self.path.display());
                return Ok(Settings::default());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|source| AcquireError::InvalidSettings {
            path: self.path.clone(),
            source,
        })
    }

    /// Write settings, creating the parent directory if needed
    pub async fn save(&self, settings: &Settings) -> Result<(), AcquireError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(settings).map_err(|source| {
            AcquireError::InvalidSettings {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, content).await?;

        info!("Saved settings to {}", self.path.display());
        Ok(())
    }

    /// Overwrite the file with the defaults and return them
    pub async fn reset(&self) -> Result<Settings, AcquireError> {
        let settings = Settings::default();
        self.save(&settings).await?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.load().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        let settings = Settings {
            seven_zip_path: PathBuf::from("/usr/bin/7za"),
            connect_timeout_secs: 5,
            ..Settings::default()
        };

        store.save(&settings).await.unwrap();
        assert_eq!(store.load().await.unwrap(), settings);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"sevenZipPath\""));
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SettingsStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, AcquireError::InvalidSettings { .. }));
    }
}
