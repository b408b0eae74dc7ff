//! Account snapshot persistence.
//!
//! A provider loads the whole account set once at startup and saves the
//! whole set once at shutdown. Either the complete set is read or written,
//! or an error is returned.

mod json;
mod memory;
mod sqlite;

use std::future::Future;

use crate::account::Account;

pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Errors reported by a persistence provider.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be turned back into accounts.
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),
}

/// Bulk snapshot store for the account index.
pub trait PersistenceProvider: Send + Sync + 'static {
    /// Load every stored account. A store with no snapshot yields an empty list.
    fn load_all(&self) -> impl Future<Output = Result<Vec<Account>, PersistenceError>> + Send;

    /// Replace the stored snapshot with `accounts`.
    fn save_all(
        &self,
        accounts: &[Account],
    ) -> impl Future<Output = Result<(), PersistenceError>> + Send;
}
