//! Account lifecycle manager.
//!
//! The manager owns the authoritative in-memory index of accounts and keeps
//! the identity directory in step with it. Every mutation updates the index
//! first and then pushes the matching record to the directory in the same
//! call. The index lock is never held across a collaborator call.
//!
//! Mutations of one username are serialised by a per-username async lock
//! held from the first read to the last directory call, so once no call is
//! in flight the directory matches the index. Races on a single username
//! resolve in lock order:
//! - two `add_account` calls: one succeeds, the other gets `Conflict`;
//! - two `update_password` calls: both succeed, the second sees the first's
//!   password in the history and its hash is the one left in place;
//! - `delete_account` first: a waiting `update_password` fails with
//!   `NotFound`;
//! - `update_password` first: it completes, then the delete removes the
//!   account from both sides.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

use crate::account::{Account, PasswordPolicy, validate_new_account};
use crate::config::LifecycleConfig;
use crate::directory::{DirectoryError, DirectoryRecord, IdentityDirectory};
use crate::store::PersistenceProvider;
use crate::{Error, Result};

/// Outcome of one expiration sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Accounts examined.
    pub scanned: usize,
    /// Accounts newly flagged expired in the directory.
    pub flagged: usize,
    /// Accounts whose directory update failed; retried next sweep.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Index {
    accounts: HashMap<String, Account>,
    /// Usernames already flagged expired in the directory.
    flagged: HashSet<String>,
}

/// Async locks keyed by username. Entries exist only while held or awaited.
#[derive(Debug, Default)]
struct UserLocks {
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    async fn lock(&self, username: &str) -> UserGuard<'_> {
        let slot = Arc::clone(self.slots.lock().entry(username.to_string()).or_default());
        let guard = slot.lock_owned().await;
        UserGuard {
            locks: self,
            username: username.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

struct UserGuard<'a> {
    locks: &'a UserLocks,
    username: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots.lock();
        drop(self.guard.take());
        // the map holds the last reference once nobody holds or waits
        if slots
            .get(&self.username)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.username);
        }
    }
}

/// Owns the account index and synchronises it with its collaborators.
#[derive(Debug)]
pub struct AccountManager<D, P> {
    index: RwLock<Index>,
    users: UserLocks,
    policy: PasswordPolicy,
    config: LifecycleConfig,
    directory: Arc<D>,
    provider: Arc<P>,
}

impl<D, P> AccountManager<D, P>
where
    D: IdentityDirectory,
    P: PersistenceProvider,
{
    /// Create a manager with an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(config: LifecycleConfig, directory: Arc<D>, provider: Arc<P>) -> Result<Self> {
        config.validate()?;
        let policy = PasswordPolicy::new(config.hashing, config.password_history_limit)?;
        Ok(Self {
            index: RwLock::new(Index::default()),
            users: UserLocks::default(),
            policy,
            config,
            directory,
            provider,
        })
    }

    /// Lifecycle configuration.
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Password policy in force.
    pub const fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Identity directory this manager writes to.
    pub fn directory(&self) -> &Arc<D> {
        &self.directory
    }

    /// Persistence provider used for hydration and flush.
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Number of indexed accounts.
    pub fn len(&self) -> usize {
        self.index.read().accounts.len()
    }

    /// Returns true if no accounts are indexed.
    pub fn is_empty(&self) -> bool {
        self.index.read().accounts.is_empty()
    }

    /// Indexed usernames in sorted order.
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index.read().accounts.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether the sweep has flagged `username` expired in the directory.
    pub fn is_flagged(&self, username: &str) -> bool {
        self.index.read().flagged.contains(username)
    }

    /// Look up an account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `username` is not indexed.
    pub fn get_account(&self, username: &str) -> Result<Account> {
        self.index
            .read()
            .accounts
            .get(username)
            .cloned()
            .ok_or_else(|| not_found(username))
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if the username or roles break the input rules.
    /// - [`Error::Conflict`] if the directory already knows `username`, or a
    ///   concurrent call registered it first.
    /// - [`Error::ConsistencyFault`] if the index holds `username` while the
    ///   directory does not.
    /// - [`Error::Directory`] / [`Error::Hashing`] on collaborator failure.
    pub async fn add_account<I, R>(
        &self,
        username: &str,
        plain_password: &str,
        roles: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let roles: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        validate_new_account(username, &roles).map_err(Error::Validation)?;

        let _user = self.users.lock(username).await;

        if self.directory.exists(username).await? {
            return Err(conflict(username));
        }
        if self.index.read().accounts.contains_key(username) {
            error!(username, "Account is indexed but missing from the directory");
            return Err(Error::ConsistencyFault(format!(
                "<{username}> is indexed but unknown to the directory"
            )));
        }

        let password_hash = self.policy.hash(plain_password)?;
        let account = Account::new(username, password_hash, roles, self.next_expiry()?);

        if !self.insert_if_absent(&account, false) {
            return Err(conflict(username));
        }
        self.directory
            .create(&DirectoryRecord::from_account(&account, false))
            .await?;

        debug!(username, "Account created");
        Ok(())
    }

    /// Rotate an account's password.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `username` is not indexed (including when a
    ///   concurrent delete got there first).
    /// - [`Error::PolicyViolation`] if the password is in the account's history.
    /// - [`Error::ConsistencyFault`] if the directory has no record for an
    ///   indexed account.
    /// - [`Error::Directory`] / [`Error::Hashing`] on collaborator failure.
    pub async fn update_password(&self, username: &str, new_plain_password: &str) -> Result<()> {
        let _user = self.users.lock(username).await;
        let current = self.get_account(username)?;

        if self
            .policy
            .is_reused(new_plain_password, &current.password_history)
        {
            return Err(Error::PolicyViolation(format!(
                "Password for <{username}> matches one of the last {} passwords",
                self.policy.history_limit()
            )));
        }

        let password_hash = self.policy.hash(new_plain_password)?;
        let mut history = current.password_history.clone();
        self.policy.push_history(&mut history, password_hash.clone());
        let replacement = current.with_password(password_hash, history, self.next_expiry()?);

        {
            let mut index = self.index.write();
            let Some(slot) = index.accounts.get_mut(username) else {
                return Err(not_found(username));
            };
            *slot = replacement.clone();
            index.flagged.remove(username);
        }

        self.push_update(&DirectoryRecord::from_account(&replacement, false))
            .await?;

        debug!(username, "Password updated");
        Ok(())
    }

    /// Remove an account from the index and the directory.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if `username` is not indexed.
    /// - [`Error::ConsistencyFault`] if the directory had no record for it.
    /// - [`Error::Directory`] on collaborator failure.
    pub async fn delete_account(&self, username: &str) -> Result<()> {
        let _user = self.users.lock(username).await;
        {
            let mut index = self.index.write();
            if index.accounts.remove(username).is_none() {
                return Err(not_found(username));
            }
            index.flagged.remove(username);
        }

        match self.directory.delete(username).await {
            Ok(()) => {}
            Err(DirectoryError::UnknownUser(_)) => {
                error!(username, "Deleted account was missing from the directory");
                return Err(Error::ConsistencyFault(format!(
                    "<{username}> was indexed but unknown to the directory"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        debug!(username, "Account deleted");
        Ok(())
    }

    /// Hydrate the index from the persistence provider and project every
    /// account into the directory. Returns the number of accounts loaded.
    ///
    /// Accounts already indexed are kept as they are, so calling this twice
    /// is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] or [`Error::Directory`] on collaborator
    /// failure.
    pub async fn restore_accounts(&self) -> Result<usize> {
        info!("Start restoring accounts");
        let accounts = self.provider.load_all().await?;
        let now = Utc::now();
        let total = accounts.len();

        for account in accounts {
            let _user = self.users.lock(&account.username).await;
            let expired = account.is_expired_at(now);
            self.insert_if_absent(&account, expired);
            let Ok(indexed) = self.get_account(&account.username) else {
                continue;
            };
            let expired = self.is_flagged(&indexed.username);
            let record = DirectoryRecord::from_account(&indexed, expired);
            if self.directory.exists(&record.username).await? {
                self.directory.update(&record).await?;
            } else {
                self.directory.create(&record).await?;
            }
        }

        info!("{total} accounts have been restored");
        Ok(total)
    }

    /// Write a point-in-time snapshot of the index to the persistence
    /// provider. Returns the number of accounts saved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the provider fails.
    pub async fn persist_accounts(&self) -> Result<usize> {
        let mut snapshot: Vec<Account> = self.index.read().accounts.values().cloned().collect();
        snapshot.sort_by(|a, b| a.username.cmp(&b.username));

        self.provider.save_all(&snapshot).await?;
        info!("{} accounts have been saved", snapshot.len());
        Ok(snapshot.len())
    }

    /// Flag every account that has expired by now. See
    /// [`sweep_expired_at`](Self::sweep_expired_at).
    pub async fn sweep_expired(&self) -> SweepReport {
        self.sweep_expired_at(Utc::now()).await
    }

    /// Flag in the directory every account expired at `now` that is not
    /// flagged yet.
    ///
    /// A failed directory update is logged and skipped; the account stays
    /// unflagged and is retried by the next sweep. Index entries are never
    /// removed here. An account deleted or given a new password while the
    /// sweep runs is left alone.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> SweepReport {
        let (scanned, candidates) = {
            let index = self.index.read();
            let candidates: Vec<String> = index
                .accounts
                .values()
                .filter(|a| a.is_expired_at(now) && !index.flagged.contains(&a.username))
                .map(|a| a.username.clone())
                .collect();
            (index.accounts.len(), candidates)
        };

        let mut report = SweepReport {
            scanned,
            ..SweepReport::default()
        };

        for username in &candidates {
            let _user = self.users.lock(username).await;
            let record = {
                let index = self.index.read();
                match index.accounts.get(username) {
                    Some(account)
                        if account.is_expired_at(now) && !index.flagged.contains(username) =>
                    {
                        DirectoryRecord::from_account(account, true)
                    }
                    _ => continue,
                }
            };

            if let Err(e) = self.directory.update(&record).await {
                warn!(username = %username, error = %e, "Failed to flag expired account");
                report.failed += 1;
                continue;
            }

            self.index.write().flagged.insert(username.clone());
            debug!(username = %username, "Account expired");
            report.flagged += 1;
        }

        debug!(
            "Expiration sweep: {} of {} accounts have been expired",
            report.flagged, report.scanned
        );
        report
    }

    fn next_expiry(&self) -> Result<DateTime<Utc>> {
        Utc::now()
            .checked_add_signed(self.config.expiration()?)
            .ok_or_else(|| Error::Config("expiration_period overflows the calendar".to_string()))
    }

    /// Insert `account` unless its username is already indexed. Returns true
    /// if the account was inserted.
    fn insert_if_absent(&self, account: &Account, expired: bool) -> bool {
        let mut index = self.index.write();
        if index.accounts.contains_key(&account.username) {
            return false;
        }
        index
            .accounts
            .insert(account.username.clone(), account.clone());
        if expired {
            index.flagged.insert(account.username.clone());
        }
        true
    }

    async fn push_update(&self, record: &DirectoryRecord) -> Result<()> {
        match self.directory.update(record).await {
            Ok(()) => Ok(()),
            Err(DirectoryError::UnknownUser(_)) => {
                error!(
                    username = %record.username,
                    "Indexed account is missing from the directory"
                );
                Err(Error::ConsistencyFault(format!(
                    "<{}> is indexed but unknown to the directory",
                    record.username
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn conflict(username: &str) -> Error {
    Error::Conflict(format!("User <{username}> already exists"))
}

fn not_found(username: &str) -> Error {
    Error::NotFound(format!("<{username}> not found"))
}
