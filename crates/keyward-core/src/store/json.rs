//! File-backed snapshot store.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{PersistenceError, PersistenceProvider};
use crate::account::Account;

/// Stores the account snapshot as a JSON array in a single file.
///
/// Saves go to a sibling temporary file which is then renamed over the
/// target, so readers see either the old or the new snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store reading and writing `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("accounts"), OsString::from);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistenceProvider for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<Account>, PersistenceError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No snapshot at {:?}, starting empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let accounts: Vec<Account> = serde_json::from_slice(&contents)?;
        info!(
            "Accounts have been restored from {:?} ({} accounts)",
            self.path,
            accounts.len()
        );
        Ok(accounts)
    }

    async fn save_all(&self, accounts: &[Account]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_vec_pretty(accounts)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, contents).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        info!(
            "{} accounts have been saved to {:?}",
            accounts.len(),
            self.path
        );
        Ok(())
    }
}
