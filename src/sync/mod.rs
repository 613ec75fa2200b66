//! sync
//!
//! Background sync scheduler.
//!
//! A single periodic task reconciles the store with the master repository:
//! sleep for the configured interval, call `sync()`, decide per outcome
//! whether to keep looping or escalate, repeat until shut down.
//!
//! # Outcome policy
//!
//! - [`SyncStatus::Conflicted`]: warn with the conflicting paths and keep
//!   looping. Conflicts are a normal steady state until someone resolves
//!   them manually; they are not a scheduler failure.
//! - Transient errors (connection failed, index lock race): warn and keep
//!   looping; the next tick retries.
//! - Configuration errors and unclassified failures: escalate. The task
//!   exits with the error so the host can abort or mark itself unhealthy
//!   instead of looping silently against a remote that cannot work.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether::{Store, StoreConfig, SyncScheduler};
//!
//! let store = Arc::new(Store::open(&config)?);
//! let handle = SyncScheduler::new(store.clone(), config.sync_interval()).spawn();
//!
//! // ... serve requests ...
//!
//! handle.shutdown().await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::git::{GitError, SyncStatus};
use crate::store::{Store, StoreError};

/// The slice of the store the scheduler drives.
///
/// [`Store`] implements this; tests substitute scripted fakes.
pub trait SyncDriver: Send + Sync + 'static {
    /// Run one reconciliation cycle.
    fn sync(&self) -> Result<SyncStatus, StoreError>;
}

impl SyncDriver for Store {
    fn sync(&self) -> Result<SyncStatus, StoreError> {
        Store::sync(self)
    }
}

/// Periodic driver of [`SyncDriver::sync`].
pub struct SyncScheduler {
    driver: Arc<dyn SyncDriver>,
    interval: Duration,
}

/// Handle to a running scheduler task.
///
/// Dropping the handle does not stop the task; call
/// [`SchedulerHandle::shutdown`] for a graceful stop, or
/// [`SchedulerHandle::join`] to wait for an escalation.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<Result<(), StoreError>>,
}

impl SchedulerHandle {
    /// Signal a graceful stop and wait for the task to finish.
    ///
    /// Returns the escalation error if the task had already failed.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        // The task may already have exited; a closed channel is fine.
        let _ = self.stop.send(true);
        self.join().await
    }

    /// Wait for the task to finish without signalling it.
    ///
    /// Completes only when the scheduler escalates (or was shut down
    /// through another handle to the same channel).
    pub async fn join(self) -> Result<(), StoreError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Git(GitError::Internal {
                message: format!("sync scheduler task panicked: {e}"),
            })),
        }
    }

    /// Whether the task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl SyncScheduler {
    /// Build a scheduler ticking every `interval`.
    pub fn new(driver: Arc<dyn SyncDriver>, interval: Duration) -> Self {
        Self { driver, interval }
    }

    /// Spawn the scheduler onto the current tokio runtime.
    ///
    /// The first sync happens one full interval after spawn (the store was
    /// just opened and pulled; there is nothing to reconcile yet).
    pub fn spawn(self) -> SchedulerHandle {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Self::run(self.driver, self.interval, stop_rx));
        SchedulerHandle { stop, task }
    }

    async fn run(
        driver: Arc<dyn SyncDriver>,
        interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), StoreError> {
        info!(interval_secs = interval.as_secs(), "sync scheduler started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval() fires immediately; consume that tick so the loop
        // sleeps first, like the original sleep-then-sync cadence.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    // A closed channel means every handle is gone; stop
                    // rather than spin.
                    if changed.is_err() || *stop.borrow() {
                        info!("sync scheduler stopping");
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    Self::tick(&driver).await?;
                }
            }
        }
    }

    /// Run one sync on the blocking pool and apply the outcome policy.
    async fn tick(driver: &Arc<dyn SyncDriver>) -> Result<(), StoreError> {
        debug!("synchronizing with master repository");

        let worker = Arc::clone(driver);
        let result = tokio::task::spawn_blocking(move || worker.sync()).await;

        match result {
            Ok(Ok(SyncStatus::Synced)) => {
                debug!("sync complete");
                Ok(())
            }
            Ok(Ok(SyncStatus::Conflicted(paths))) => {
                warn!(
                    conflicts = %paths.join(", "),
                    "sync hit merge conflicts; the listed files must be merged manually"
                );
                Ok(())
            }
            Ok(Err(e)) if e.is_transient() => {
                warn!(error = %e, "sync attempt failed; will retry on next tick");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "sync failed unrecoverably; stopping scheduler");
                Err(e)
            }
            Err(join_err) => {
                let e = StoreError::Git(GitError::Internal {
                    message: format!("sync task panicked: {join_err}"),
                });
                error!(error = %e, "sync failed unrecoverably; stopping scheduler");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fake driver that replays a script of outcomes, then keeps returning
    /// `Synced`.
    struct ScriptedDriver {
        script: Mutex<Vec<Result<SyncStatus, StoreError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedDriver {
        fn new(script: Vec<Result<SyncStatus, StoreError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SyncDriver for ScriptedDriver {
        fn sync(&self) -> Result<SyncStatus, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(SyncStatus::Synced)
            } else {
                script.remove(0)
            }
        }
    }

    fn connection_failed() -> StoreError {
        StoreError::Git(GitError::ConnectionFailed {
            message: "connection refused".to_string(),
        })
    }

    fn configuration_error() -> StoreError {
        StoreError::Git(GitError::Configuration {
            url: "/srv/git/wiki.git".to_string(),
            hint: "check remote_url".to_string(),
        })
    }

    const TICK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn connection_failure_retries_on_next_tick() {
        let driver = Arc::new(ScriptedDriver::new(vec![Err(connection_failed())]));
        let handle = SyncScheduler::new(driver.clone(), TICK).spawn();

        // Enough time for the failing tick plus at least one successful one.
        tokio::time::sleep(TICK * 6).await;

        assert!(handle.is_running(), "scheduler must survive a transient failure");
        assert!(driver.calls() >= 2, "expected a retry after the failure");

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn merge_conflict_keeps_looping() {
        let driver = Arc::new(ScriptedDriver::new(vec![Ok(SyncStatus::Conflicted(vec![
            "pages/Home.textile".to_string(),
        ]))]));
        let handle = SyncScheduler::new(driver.clone(), TICK).spawn();

        tokio::time::sleep(TICK * 6).await;

        assert!(handle.is_running(), "conflicts are not a scheduler failure");
        assert!(driver.calls() >= 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn configuration_error_escalates() {
        let driver = Arc::new(ScriptedDriver::new(vec![Err(configuration_error())]));
        let handle = SyncScheduler::new(driver.clone(), TICK).spawn();

        let result = handle.join().await;
        match result {
            Err(StoreError::Git(GitError::Configuration { .. })) => {}
            other => panic!("expected escalated configuration error, got {:?}", other),
        }
        assert_eq!(driver.calls(), 1, "no retry after escalation");
    }

    #[tokio::test]
    async fn unclassified_error_escalates() {
        let driver = Arc::new(ScriptedDriver::new(vec![Err(StoreError::Git(
            GitError::Internal {
                message: "unexpected".to_string(),
            },
        ))]));
        let handle = SyncScheduler::new(driver, TICK).spawn();

        assert!(handle.join().await.is_err());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let driver = Arc::new(ScriptedDriver::new(Vec::new()));
        let handle = SyncScheduler::new(driver.clone(), Duration::from_secs(3600)).spawn();

        // Stop while the scheduler is waiting out its first interval.
        handle.shutdown().await.unwrap();
        assert_eq!(driver.calls(), 0);
    }

    #[tokio::test]
    async fn ticks_repeat_until_stopped() {
        let driver = Arc::new(ScriptedDriver::new(Vec::new()));
        let handle = SyncScheduler::new(driver.clone(), TICK).spawn();

        tokio::time::sleep(TICK * 8).await;
        handle.shutdown().await.unwrap();

        assert!(driver.calls() >= 3);
    }
}
