//! Start/stop orchestration around the account manager.

use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::daemon::{DaemonHandle, ExpirationDaemon};
use crate::directory::IdentityDirectory;
use crate::manager::AccountManager;
use crate::store::PersistenceProvider;

/// A running account service: hydrated manager plus its expiration daemon.
pub struct Service<D, P> {
    manager: Arc<AccountManager<D, P>>,
    daemon: DaemonHandle,
}

impl<D, P> Service<D, P>
where
    D: IdentityDirectory,
    P: PersistenceProvider,
{
    /// Start the expiration daemon, then hydrate the index.
    ///
    /// The manager is only handed out once hydration has completed.
    ///
    /// # Errors
    ///
    /// Returns the hydration error; the daemon is stopped before returning.
    pub async fn start(manager: Arc<AccountManager<D, P>>) -> Result<Self> {
        let daemon = ExpirationDaemon::new(Arc::clone(&manager)).spawn();

        match manager.restore_accounts().await {
            Ok(count) => {
                info!("Account service started with {count} accounts");
                Ok(Self { manager, daemon })
            }
            Err(e) => {
                daemon.shutdown().await;
                Err(e)
            }
        }
    }

    /// The hydrated manager.
    pub const fn manager(&self) -> &Arc<AccountManager<D, P>> {
        &self.manager
    }

    /// The expiration daemon.
    pub const fn daemon(&self) -> &DaemonHandle {
        &self.daemon
    }

    /// Stop the daemon and flush the index. Returns the number of accounts
    /// saved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`](crate::Error::Persistence) if the flush fails.
    pub async fn stop(self) -> Result<usize> {
        self.daemon.shutdown().await;
        let saved = self.manager.persist_accounts().await?;
        info!("Account service stopped");
        Ok(saved)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{Duration, Utc};

    use super::*;
    use crate::account::{Account, PasswordPolicy};
    use crate::config::{HashingConfig, LifecycleConfig};
    use crate::directory::InMemoryDirectory;
    use crate::store::MemoryStore;

    fn manager(store: MemoryStore) -> Arc<AccountManager<InMemoryDirectory, MemoryStore>> {
        let config = LifecycleConfig {
            hashing: HashingConfig::minimal(),
            ..LifecycleConfig::default()
        };
        let policy = PasswordPolicy::new(config.hashing, 3).unwrap();
        Arc::new(
            AccountManager::new(
                config,
                Arc::new(InMemoryDirectory::new(policy)),
                Arc::new(store),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn start_hydrates_and_stop_flushes() {
        let seed = Account::new(
            "alice",
            "$argon2id$placeholder",
            BTreeSet::from(["USER".to_string()]),
            Utc::now() + Duration::hours(1),
        );
        let service = Service::start(manager(MemoryStore::with_accounts(vec![seed.clone()])))
            .await
            .unwrap();
        assert_eq!(service.manager().get_account("alice").unwrap(), seed);

        service
            .manager()
            .add_account("bobby", "secret-1", ["USER"])
            .await
            .unwrap();

        let manager = Arc::clone(service.manager());
        assert_eq!(service.stop().await.unwrap(), 2);
        let saved = manager.provider().saved();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0], seed);
    }
}
