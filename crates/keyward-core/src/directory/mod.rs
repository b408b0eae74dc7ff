//! Identity directory contract.
//!
//! The directory holds the credential record consulted at authentication
//! time. The account manager keeps it in step with its own index by pushing
//! every mutation through.

mod memory;

use std::collections::BTreeSet;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::account::Account;

pub use memory::InMemoryDirectory;

/// Per-user record stored by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Login name.
    pub username: String,
    /// PHC-format hash of the active password.
    pub password_hash: String,
    /// Granted roles.
    pub roles: BTreeSet<String>,
    /// Whether authentication should be refused because the account expired.
    pub expired: bool,
}

impl DirectoryRecord {
    /// Project an account into its directory record.
    #[must_use]
    pub fn from_account(account: &Account, expired: bool) -> Self {
        Self {
            username: account.username.clone(),
            password_hash: account.password_hash.clone(),
            roles: account.roles.clone(),
            expired,
        }
    }
}

/// Errors reported by a directory backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The directory has no record for this user.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The directory already has a record for this user.
    #[error("duplicate user: {0}")]
    DuplicateUser(String),

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Canonical user store used for authentication checks.
///
/// All calls may block on I/O. Callers must not hold locks across them.
pub trait IdentityDirectory: Send + Sync + 'static {
    /// Whether a record exists for `username`.
    fn exists(&self, username: &str) -> impl Future<Output = Result<bool, DirectoryError>> + Send;

    /// Insert a new record.
    fn create(
        &self,
        record: &DirectoryRecord,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Replace an existing record.
    fn update(
        &self,
        record: &DirectoryRecord,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Remove the record for `username`.
    fn delete(&self, username: &str) -> impl Future<Output = Result<(), DirectoryError>> + Send;
}
