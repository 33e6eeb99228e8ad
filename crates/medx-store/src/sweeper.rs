//! # Retention Sweeper
//!
//! Background task that calls [`DirectiveStore::sweep`] on a fixed interval
//! and then deletes the blobs of removed records. The sweep itself runs on
//! the blocking pool so a large store never stalls request handlers.
//!
//! The interval is clamped to the smallest configured retention bound.

use std::sync::Arc;
use std::time::Duration;

use medx_core::RetentionPolicyTable;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::blob::PhiBlobStore;
use crate::store::{DirectiveStore, SweepReport};

/// Periodic retention sweep.
pub struct RetentionSweeper {
    store: Arc<DirectiveStore>,
    blobs: Option<Arc<dyn PhiBlobStore>>,
    interval: Duration,
}

/// Running sweeper; dropping it leaves the task running until `shutdown`.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<DirectiveStore>, configured: Duration) -> Self {
        let interval = Self::effective_interval(configured, store.retention_table());
        Self {
            store,
            blobs: None,
            interval,
        }
    }

    /// Delete blobs of swept records from `blobs`.
    pub fn with_blob_store(mut self, blobs: Arc<dyn PhiBlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `configured`, but never longer than the smallest retention bound and
    /// never zero.
    pub fn effective_interval(configured: Duration, table: &RetentionPolicyTable) -> Duration {
        let bounded = match table.smallest_bound() {
            Some(bound) => configured.min(Duration::from_secs(bound.as_secs())),
            None => configured,
        };
        bounded.max(Duration::from_secs(1))
    }

    /// Run one sweep and purge blobs. Used by the loop and directly in tests.
    pub async fn run_once(&self) -> SweepReport {
        let store = Arc::clone(&self.store);
        let report = match tokio::task::spawn_blocking(move || store.sweep()).await {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "retention sweep task failed");
                return SweepReport::default();
            }
        };

        if let Some(blobs) = &self.blobs {
            for reference in &report.purged_refs {
                if let Err(err) = blobs.delete(reference).await {
                    warn!(reference = %reference, error = %err, "blob purge failed");
                }
            }
        }
        report
    }

    /// Start the loop on the current runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        info!(interval_secs = self.interval.as_secs(), "starting retention sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so startup is quiet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.run_once().await;
                        debug!(
                            examined = report.examined,
                            removed = report.removed,
                            skipped_locked = report.skipped_locked,
                            "sweep tick"
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("retention sweeper stopping");
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle { shutdown, task }
    }
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "retention sweeper join failed");
        }
    }
}
