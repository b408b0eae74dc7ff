//! `keyward` - account lifecycle service.
//!
//! Hydrates the account index from the configured snapshot store, runs the
//! expiration daemon, serves operator commands on stdin and flushes the
//! index back to the store on shutdown.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod console;
mod settings;
mod storage;

use std::future::Future;
use std::sync::Arc;

use keyward_core::{AccountManager, InMemoryDirectory, PasswordPolicy, Service};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storage::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keyward=info,keyward_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting keyward");

    let settings = settings::load().await?;
    let store = Store::open(&settings.storage).await?;
    let policy = PasswordPolicy::new(
        settings.lifecycle.hashing,
        settings.lifecycle.password_history_limit,
    )?;
    let manager = Arc::new(AccountManager::new(
        settings.lifecycle,
        Arc::new(InMemoryDirectory::new(policy)),
        Arc::new(store),
    )?);

    let service = Service::start(manager).await?;

    run_session(
        service,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await
}

/// Serve the console until input ends or `shutdown` resolves, then stop the
/// service. The index is flushed even when the console fails.
async fn run_session<R, W>(
    service: Service<InMemoryDirectory, Store>,
    input: R,
    output: W,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let manager: &AccountManager<InMemoryDirectory, Store> = service.manager();
    let served: anyhow::Result<()> = tokio::select! {
        result = console::serve(manager, input, output) => result.map_err(Into::into),
        () = shutdown => Ok(()),
    };
    if let Err(e) = &served {
        error!(error = %e, "Console failed, shutting down");
    }

    let saved = service.stop().await?;
    info!("Shutdown complete, {saved} accounts saved");
    served
}

/// Wait for Ctrl-C or SIGTERM.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use keyward_core::{HashingConfig, LifecycleConfig, MemoryStore};
    use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

    use super::*;

    /// Input that fails on every read.
    struct Broken;

    impl AsyncRead for Broken {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::other("stdin closed abruptly")))
        }
    }

    async fn service() -> Service<InMemoryDirectory, Store> {
        let config = LifecycleConfig {
            hashing: HashingConfig::minimal(),
            ..LifecycleConfig::default()
        };
        let policy = PasswordPolicy::new(config.hashing, 3).unwrap();
        let manager = AccountManager::new(
            config,
            Arc::new(InMemoryDirectory::new(policy)),
            Arc::new(Store::Memory(MemoryStore::new())),
        )
        .unwrap();
        Service::start(Arc::new(manager)).await.unwrap()
    }

    fn saved_names(service: &Service<InMemoryDirectory, Store>) -> Vec<String> {
        let Store::Memory(store) = service.manager().provider().as_ref() else {
            panic!("expected memory store");
        };
        store.saved().into_iter().map(|a| a.username).collect()
    }

    #[tokio::test]
    async fn flushes_when_input_fails() {
        let service = service().await;
        let manager = Arc::clone(service.manager());
        let input = BufReader::new((&b"add alice secret-1 USER\n"[..]).chain(Broken));
        let mut output = Vec::new();

        let result = run_session(service, input, &mut output, std::future::pending()).await;
        assert!(result.is_err());
        assert!(String::from_utf8(output).unwrap().starts_with("201"));

        let Store::Memory(store) = manager.provider().as_ref() else {
            panic!("expected memory store");
        };
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.saved()[0].username, "alice");
    }

    #[tokio::test]
    async fn flushes_on_shutdown_signal() {
        let service = service().await;
        let manager = Arc::clone(service.manager());
        manager.add_account("alice", "secret-1", ["USER"]).await.unwrap();
        assert!(saved_names(&service).is_empty());

        let result = run_session(
            service,
            BufReader::new(tokio::io::empty()),
            Vec::new(),
            std::future::ready(()),
        )
        .await;
        assert!(result.is_ok());

        let Store::Memory(store) = manager.provider().as_ref() else {
            panic!("expected memory store");
        };
        assert_eq!(store.save_count(), 1);
    }
}
