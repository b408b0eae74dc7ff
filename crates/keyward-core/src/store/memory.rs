//! Snapshot store kept in memory.

use parking_lot::Mutex;

use super::{PersistenceError, PersistenceProvider};
use crate::account::Account;

/// Provider that keeps the last saved snapshot in memory.
///
/// Nothing survives the process; useful for ephemeral runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Vec<Account>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with `accounts`.
    #[must_use]
    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            snapshot: Mutex::new(accounts),
            saves: Mutex::new(0),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn saved(&self) -> Vec<Account> {
        self.snapshot.lock().clone()
    }

    /// How many times `save_all` has been called.
    #[must_use]
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl PersistenceProvider for MemoryStore {
    async fn load_all(&self) -> Result<Vec<Account>, PersistenceError> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save_all(&self, accounts: &[Account]) -> Result<(), PersistenceError> {
        *self.snapshot.lock() = accounts.to_vec();
        *self.saves.lock() += 1;
        Ok(())
    }
}
