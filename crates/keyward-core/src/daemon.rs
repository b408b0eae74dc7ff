//! Background expiration sweeps.
//!
//! The daemon alternates between [`DaemonState::Idle`] and
//! [`DaemonState::Sweeping`] on a fixed timer. A shutdown request is only
//! observed while idle, so a sweep that has started always runs to the end.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::directory::IdentityDirectory;
use crate::manager::{AccountManager, SweepReport};
use crate::store::PersistenceProvider;

/// Shortest period between sweeps. Shorter periods are raised to this.
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// What the daemon is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Waiting for the next tick.
    Idle,
    /// Running a sweep.
    Sweeping,
    /// Loop has exited.
    Stopped,
}

/// Periodically runs [`AccountManager::sweep_expired`].
pub struct ExpirationDaemon<D, P> {
    manager: Arc<AccountManager<D, P>>,
    period: Duration,
    state: watch::Sender<DaemonState>,
    last_report: watch::Sender<Option<SweepReport>>,
}

impl<D, P> ExpirationDaemon<D, P>
where
    D: IdentityDirectory,
    P: PersistenceProvider,
{
    /// Create a daemon using the manager's configured sweep interval.
    #[must_use]
    pub fn new(manager: Arc<AccountManager<D, P>>) -> Self {
        let period = manager.config().sweep_interval();
        Self::with_period(manager, period)
    }

    /// Create a daemon with an explicit sweep period, no shorter than
    /// [`MIN_SWEEP_PERIOD`].
    #[must_use]
    pub fn with_period(manager: Arc<AccountManager<D, P>>, period: Duration) -> Self {
        let (state, _) = watch::channel(DaemonState::Idle);
        let (last_report, _) = watch::channel(None);
        Self {
            manager,
            period: period.max(MIN_SWEEP_PERIOD),
            state,
            last_report,
        }
    }

    /// Run until `shutdown` receives a message or its sender is dropped.
    ///
    /// The first sweep happens one period after the call.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            period_ms = u64::try_from(self.period.as_millis()).unwrap_or(u64::MAX),
            "Expiration daemon started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.state.send_replace(DaemonState::Sweeping);
                    let report = self.manager.sweep_expired().await;
                    debug!(
                        scanned = report.scanned,
                        flagged = report.flagged,
                        failed = report.failed,
                        "Expiration sweep finished"
                    );
                    self.last_report.send_replace(Some(report));
                    self.state.send_replace(DaemonState::Idle);
                }
                _ = shutdown.recv() => {
                    info!("Expiration daemon shutting down");
                    break;
                }
            }
        }

        self.state.send_replace(DaemonState::Stopped);
    }

    /// Spawn the daemon on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> DaemonHandle {
        let (shutdown, rx) = mpsc::channel(1);
        let state = self.state.subscribe();
        let last_report = self.last_report.subscribe();
        let task = tokio::spawn(self.run(rx));
        DaemonHandle {
            shutdown,
            state,
            last_report,
            task,
        }
    }
}

/// Handle to a spawned [`ExpirationDaemon`].
///
/// Dropping the handle also stops the daemon at its next idle point.
#[derive(Debug)]
pub struct DaemonHandle {
    shutdown: mpsc::Sender<()>,
    state: watch::Receiver<DaemonState>,
    last_report: watch::Receiver<Option<SweepReport>>,
    task: JoinHandle<()>,
}

impl DaemonHandle {
    /// Current daemon state.
    #[must_use]
    pub fn state(&self) -> DaemonState {
        *self.state.borrow()
    }

    /// Report of the most recent completed sweep.
    #[must_use]
    pub fn last_report(&self) -> Option<SweepReport> {
        *self.last_report.borrow()
    }

    /// Subscribe to sweep reports.
    #[must_use]
    pub fn reports(&self) -> watch::Receiver<Option<SweepReport>> {
        self.last_report.clone()
    }

    /// Ask the daemon to stop and wait for it. An in-flight sweep finishes
    /// first.
    pub async fn shutdown(self) {
        // a full channel means a stop is already pending
        let _ = self.shutdown.try_send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Expiration daemon task failed");
        }
    }
}
