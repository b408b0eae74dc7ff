//! End-to-end lifecycle tests.
//!
//! These drive the manager through hydration, concurrent mutation and flush
//! against the bundled directory and snapshot stores.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use keyward_core::{
    Account, AccountManager, Error, HashingConfig, InMemoryDirectory, JsonFileStore,
    LifecycleConfig, MemoryStore, PasswordPolicy, PersistenceProvider, Service, SqliteStore,
};

fn config() -> LifecycleConfig {
    LifecycleConfig {
        hashing: HashingConfig::minimal(),
        ..LifecycleConfig::default()
    }
}

fn build<P: PersistenceProvider>(provider: P) -> Arc<AccountManager<InMemoryDirectory, P>> {
    let config = config();
    let policy = PasswordPolicy::new(config.hashing, config.password_history_limit).unwrap();
    Arc::new(
        AccountManager::new(
            config,
            Arc::new(InMemoryDirectory::new(policy)),
            Arc::new(provider),
        )
        .unwrap(),
    )
}

fn seed_account(policy: &PasswordPolicy, name: &str) -> Account {
    Account::new(
        name,
        policy.hash(&format!("{name}-pw")).unwrap(),
        BTreeSet::from(["USER".to_string()]),
        Utc::now() + Duration::hours(12),
    )
}

#[tokio::test]
async fn restore_mutate_persist_round_trip() {
    let policy = PasswordPolicy::new(HashingConfig::minimal(), 3).unwrap();
    let seeded = vec![
        seed_account(&policy, "alice"),
        seed_account(&policy, "bobby"),
        seed_account(&policy, "carol"),
    ];
    let manager = build(MemoryStore::with_accounts(seeded.clone()));

    assert_eq!(manager.restore_accounts().await.unwrap(), 3);
    manager.delete_account("bobby").await.unwrap();
    manager
        .add_account("daniel", "daniel-pw", ["USER", "AUDITOR"])
        .await
        .unwrap();
    manager.persist_accounts().await.unwrap();

    let saved = manager.provider().saved();
    let names: Vec<&str> = saved.iter().map(|a| a.username.as_str()).collect();
    assert_eq!(names, vec!["alice", "carol", "daniel"]);
    assert_eq!(saved[0], seeded[0]);
    assert_eq!(saved[1], seeded[2]);
}

#[tokio::test]
async fn json_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.json");

    let first = build(JsonFileStore::new(&path));
    let service = Service::start(Arc::clone(&first)).await.unwrap();
    first.add_account("alice", "first-pw", ["USER"]).await.unwrap();
    first.update_password("alice", "second-pw").await.unwrap();
    let before = first.get_account("alice").unwrap();
    assert_eq!(service.stop().await.unwrap(), 1);

    let second = build(JsonFileStore::new(&path));
    let service = Service::start(Arc::clone(&second)).await.unwrap();
    assert_eq!(second.get_account("alice").unwrap(), before);
    assert!(second.directory().authenticate("alice", "second-pw"));

    let err = second.update_password("alice", "first-pw").await.unwrap_err();
    assert!(matches!(err, Error::PolicyViolation(_)));
    service.stop().await.unwrap();
}

#[tokio::test]
async fn sqlite_store_round_trip() {
    let manager = build(SqliteStore::in_memory().await.unwrap());
    manager.add_account("alice", "first-pw", ["USER"]).await.unwrap();
    manager.update_password("alice", "second-pw").await.unwrap();
    manager.add_account("bobby", "bobby-pw", ["ADMIN"]).await.unwrap();
    manager.persist_accounts().await.unwrap();

    let loaded = manager.provider().load_all().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0], manager.get_account("alice").unwrap());
    assert_eq!(loaded[0].password_history.len(), 2);
    assert_eq!(loaded[1], manager.get_account("bobby").unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_on_distinct_names() {
    let manager = build(MemoryStore::new());

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .add_account(&format!("user-{i:02}"), "shared-pw", ["USER"])
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(manager.len(), 16);
    for i in 0..16 {
        let name = format!("user-{i:02}");
        assert!(manager.get_account(&name).is_ok());
        assert!(manager.directory().authenticate(&name, "shared-pw"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_keep_histories_apart() {
    let manager = build(MemoryStore::new());
    let names: Vec<String> = (0..8).map(|i| format!("user-{i:02}")).collect();
    for name in &names {
        manager.add_account(name, "initial-pw", ["USER"]).await.unwrap();
    }

    let tasks: Vec<_> = names
        .iter()
        .cloned()
        .map(|name| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                for round in 0..3 {
                    manager
                        .update_password(&name, &format!("{name}-round-{round}"))
                        .await?;
                }
                Ok::<_, Error>(())
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let policy = manager.policy();
    for name in &names {
        let account = manager.get_account(name).unwrap();
        assert_eq!(account.password_history.len(), 3);
        for round in 0..3 {
            assert!(policy.is_reused(&format!("{name}-round-{round}"), &account.password_history));
        }
        assert!(!policy.is_reused("initial-pw", &account.password_history));
        assert!(manager.directory().authenticate(name, &format!("{name}-round-2")));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletes_succeed_once() {
    let manager = build(MemoryStore::new());
    manager.add_account("alice", "alice-pw", ["USER"]).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.delete_account("alice").await })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(Error::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert!(manager.is_empty());
    assert!(manager.directory().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_adds_on_same_name_conflict() {
    let manager = build(MemoryStore::new());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .add_account("alice", &format!("pw-{i}"), ["USER"])
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => succeeded += 1,
            Err(Error::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(manager.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_on_same_name_stay_in_step() {
    let manager = build(MemoryStore::new());
    manager.add_account("alice", "alice-pw", ["USER"]).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .update_password("alice", &format!("rotated-{i}"))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let account = manager.get_account("alice").unwrap();
    let record = manager.directory().get("alice").unwrap();
    assert_eq!(record.password_hash, account.password_hash);
    assert_eq!(account.password_history.len(), 3);
    assert_eq!(account.password_history.back(), Some(&account.password_hash));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_and_delete_on_same_name() {
    let manager = build(MemoryStore::new());
    manager.add_account("alice", "alice-pw", ["USER"]).await.unwrap();

    let updates: Vec<_> = (0..4)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .update_password("alice", &format!("rotated-{i}"))
                    .await
            })
        })
        .collect();
    let delete = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.delete_account("alice").await })
    };

    delete.await.unwrap().unwrap();
    for task in updates {
        match task.await.unwrap() {
            Ok(()) | Err(Error::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(manager.is_empty());
    assert!(manager.directory().is_empty());
}
