//! Account model types.

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user account as held by the index.
///
/// Accounts are never edited field by field once indexed; a password change
/// produces a new value that replaces the old one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique login name.
    pub username: String,
    /// PHC-format hash of the active password.
    pub password_hash: String,
    /// Roles granted at creation.
    pub roles: BTreeSet<String>,
    /// Previous password hashes, oldest first. Includes the active one.
    pub password_history: VecDeque<String>,
    /// Instant after which the account counts as expired.
    pub expires_at: DateTime<Utc>,
}

impl Account {
    /// Create a freshly registered account whose history holds only
    /// `password_hash`.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        roles: BTreeSet<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let password_hash = password_hash.into();
        Self {
            username: username.into(),
            password_history: VecDeque::from([password_hash.clone()]),
            password_hash,
            roles,
            expires_at,
        }
    }

    /// Returns true if the account is expired at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the account is expired right now.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Build the replacement account after a password change.
    #[must_use]
    pub fn with_password(
        &self,
        password_hash: String,
        password_history: VecDeque<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            username: self.username.clone(),
            password_hash,
            roles: self.roles.clone(),
            password_history,
            expires_at,
        }
    }
}
