//! Runtime selection of the snapshot store.

use keyward_core::{
    Account, JsonFileStore, MemoryStore, PersistenceError, PersistenceProvider, SqliteStore,
};

use crate::settings::StorageSettings;

/// One of the bundled snapshot stores, chosen by settings.
#[derive(Debug)]
pub enum Store {
    /// JSON file.
    Json(JsonFileStore),
    /// `SQLite` database.
    Sqlite(SqliteStore),
    /// In memory only.
    Memory(MemoryStore),
}

impl Store {
    /// Open the store described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or its path is not
    /// valid UTF-8.
    pub async fn open(settings: &StorageSettings) -> anyhow::Result<Self> {
        let store = match settings {
            StorageSettings::Json { path } => Self::Json(JsonFileStore::new(path)),
            StorageSettings::Sqlite { path } => {
                let Some(url_path) = path.to_str() else {
                    anyhow::bail!("sqlite path {} is not valid UTF-8", path.display());
                };
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    tokio::fs::create_dir_all(parent).await?;
                }
                Self::Sqlite(SqliteStore::new(url_path).await?)
            }
            StorageSettings::Memory => Self::Memory(MemoryStore::new()),
        };
        Ok(store)
    }
}

impl PersistenceProvider for Store {
    async fn load_all(&self) -> Result<Vec<Account>, PersistenceError> {
        match self {
            Self::Json(store) => store.load_all().await,
            Self::Sqlite(store) => store.load_all().await,
            Self::Memory(store) => store.load_all().await,
        }
    }

    async fn save_all(&self, accounts: &[Account]) -> Result<(), PersistenceError> {
        match self {
            Self::Json(store) => store.save_all(accounts).await,
            Self::Sqlite(store) => store.save_all(accounts).await,
            Self::Memory(store) => store.save_all(accounts).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_each_kind() {
        let dir = tempfile::tempdir().unwrap();

        let json = Store::open(&StorageSettings::Json {
            path: dir.path().join("accounts.json"),
        })
        .await
        .unwrap();
        assert!(matches!(json, Store::Json(_)));
        assert!(json.load_all().await.unwrap().is_empty());

        let sqlite = Store::open(&StorageSettings::Sqlite {
            path: dir.path().join("db").join("accounts.db"),
        })
        .await
        .unwrap();
        assert!(matches!(sqlite, Store::Sqlite(_)));
        assert!(sqlite.load_all().await.unwrap().is_empty());

        let memory = Store::open(&StorageSettings::Memory).await.unwrap();
        memory.save_all(&[]).await.unwrap();
        assert!(memory.load_all().await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_sqlite_path_is_an_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"accounts-\xff.db"));

        let err = Store::open(&StorageSettings::Sqlite { path }).await.unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
