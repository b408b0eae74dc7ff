//! Password hashing and history rules.
//!
//! Hashes are Argon2id PHC strings with a per-hash random salt, so two
//! hashes of the same password never compare equal. Reuse detection must
//! therefore go through [`PasswordPolicy::verify`].

use std::collections::VecDeque;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use crate::config::HashingConfig;
use crate::{Error, Result};

/// Hashing and history policy shared by every account.
#[derive(Clone)]
pub struct PasswordPolicy {
    argon2: Argon2<'static>,
    history_limit: usize,
}

impl std::fmt::Debug for PasswordPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordPolicy")
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

impl PasswordPolicy {
    /// Build a policy remembering `history_limit` hashes per account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the argon2 parameters are out of range.
    pub fn new(hashing: HashingConfig, history_limit: usize) -> Result<Self> {
        let params = Params::new(
            hashing.memory_kib,
            hashing.iterations,
            hashing.parallelism,
            None,
        )
        .map_err(|e| Error::Config(format!("invalid hashing parameters: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            history_limit: history_limit.max(1),
        })
    }

    /// Number of hashes remembered per account.
    #[must_use]
    pub const fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Hash a plain-text password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Hashing`] if argon2 rejects the input.
    pub fn hash(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plain.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Hashing(e.to_string()))
    }

    /// Check `plain` against a stored hash. Unparsable hashes never match.
    #[must_use]
    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        PasswordHash::new(hash).is_ok_and(|parsed| {
            self.argon2
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
    }

    /// Returns true if `plain` matches any hash in `history`.
    #[must_use]
    pub fn is_reused<'a>(&self, plain: &str, history: impl IntoIterator<Item = &'a String>) -> bool {
        history.into_iter().any(|hash| self.verify(plain, hash))
    }

    /// Append `hash` to `history`, evicting from the front to stay within
    /// the limit.
    pub fn push_history(&self, history: &mut VecDeque<String>, hash: String) {
        evict_oldest(history, self.history_limit);
        history.push_back(hash);
    }
}

/// Drop the oldest entries until `history` has room for one more under
/// `limit`.
pub fn evict_oldest(history: &mut VecDeque<String>, limit: usize) {
    while !history.is_empty() && history.len() >= limit {
        history.pop_front();
    }
}
