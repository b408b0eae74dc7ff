//! Service settings.

use std::path::{Path, PathBuf};

use keyward_core::LifecycleConfig;
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "KEYWARD_CONFIG";

/// Where account snapshots are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSettings {
    /// JSON file snapshot.
    Json {
        /// Snapshot file path.
        path: PathBuf,
    },
    /// `SQLite` database snapshot.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// Nothing is kept between runs.
    Memory,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self::Json {
            path: data_dir().join("accounts.json"),
        }
    }
}

/// Settings that persist across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Account lifecycle configuration.
    pub lifecycle: LifecycleConfig,
    /// Snapshot storage.
    pub storage: StorageSettings,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keyward")
}

/// Default settings file location.
#[must_use]
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("keyward")
        .join("settings.json")
}

/// Load settings from `path`, or defaults if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn load_from(path: &Path) -> anyhow::Result<Settings> {
    if !path.exists() {
        tracing::debug!("No settings at {:?}, using defaults", path);
        return Ok(Settings::default());
    }

    let contents = tokio::fs::read_to_string(path).await?;
    let settings = serde_json::from_str(&contents)?;
    tracing::info!("Settings loaded from {:?}", path);
    Ok(settings)
}

/// Load settings from the file named by [`CONFIG_ENV`], falling back to
/// [`default_path`].
///
/// # Errors
///
/// Returns an error if the settings file cannot be read or parsed.
pub async fn load() -> anyhow::Result<Settings> {
    let path = std::env::var_os(CONFIG_ENV).map_or_else(default_path, PathBuf::from);
    load_from(&path).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use keyward_core::TimeUnit;

    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("settings.json")).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn parses_storage_and_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(
            &path,
            r#"{
                "lifecycle": {"expiration_period": 7, "expiration_unit": "days"},
                "storage": {"kind": "sqlite", "path": "/var/lib/keyward/accounts.db"}
            }"#,
        )
        .await
        .unwrap();

        let settings = load_from(&path).await.unwrap();
        assert_eq!(settings.lifecycle.expiration_unit, TimeUnit::Days);
        assert_eq!(settings.lifecycle.password_history_limit, 3);
        assert_eq!(
            settings.storage,
            StorageSettings::Sqlite {
                path: PathBuf::from("/var/lib/keyward/accounts.db")
            }
        );
    }

    #[tokio::test]
    async fn memory_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, r#"{"storage": {"kind": "memory"}}"#)
            .await
            .unwrap();
        let settings = load_from(&path).await.unwrap();
        assert_eq!(settings.storage, StorageSettings::Memory);
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, "{").await.unwrap();
        assert!(load_from(&path).await.is_err());
    }
}
