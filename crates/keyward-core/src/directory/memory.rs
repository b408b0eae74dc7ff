//! In-process identity directory.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::{DirectoryError, DirectoryRecord, IdentityDirectory};
use crate::account::PasswordPolicy;

/// Directory backed by a hash map.
///
/// Authentication checks are answered from here, so an account the sweep
/// has flagged expired stops authenticating even though the manager's
/// index still holds it.
#[derive(Debug)]
pub struct InMemoryDirectory {
    records: RwLock<HashMap<String, DirectoryRecord>>,
    policy: PasswordPolicy,
}

impl InMemoryDirectory {
    /// Create an empty directory that verifies passwords with `policy`.
    #[must_use]
    pub fn new(policy: PasswordPolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Look up the record for `username`.
    #[must_use]
    pub fn get(&self, username: &str) -> Option<DirectoryRecord> {
        self.records.read().get(username).cloned()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the directory holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Check a login attempt. Expired and unknown users never authenticate.
    #[must_use]
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let Some(record) = self.get(username) else {
            return false;
        };
        if record.expired {
            debug!(username, "Refusing login for expired account");
            return false;
        }
        self.policy.verify(password, &record.password_hash)
    }
}

impl IdentityDirectory for InMemoryDirectory {
    async fn exists(&self, username: &str) -> Result<bool, DirectoryError> {
        Ok(self.records.read().contains_key(username))
    }

    async fn create(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        let mut records = self.records.write();
        if records.contains_key(&record.username) {
            return Err(DirectoryError::DuplicateUser(record.username.clone()));
        }
        records.insert(record.username.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &DirectoryRecord) -> Result<(), DirectoryError> {
        let mut records = self.records.write();
        let Some(existing) = records.get_mut(&record.username) else {
            return Err(DirectoryError::UnknownUser(record.username.clone()));
        };
        *existing = record.clone();
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), DirectoryError> {
        self.records
            .write()
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::UnknownUser(username.to_string()))
    }
}
