//! # Queue Worker
//!
//! The job-claiming loop.
//!
//! ## Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Worker::run                                    │
//! │                                                                         │
//! │   ┌──► claim_batch(worker_id, batch_size, lease)      (own tx, commit)  │
//! │   │        │                                                            │
//! │   │        ├── Err ──► log (warn if transient) ──► sleep idle_backoff ─┤
//! │   │        ├── []  ──► sleep idle_backoff ─────────────────────────────┤
//! │   │        └── entries, ascending id                                    │
//! │   │               │                                                     │
//! │   │               ▼                                                     │
//! │   │        for entry: EntryProcessor::process       (sequential)       │
//! │   │               │    shutdown requested? ──► release the rest ──► ✕   │
//! │   │               ▼                                                     │
//! │   │        log BatchStats                                               │
//! │   └───────────────┘                                                     │
//! │                                                                         │
//! │   Shutdown is checked between entries and during the idle sleep. An     │
//! │   entry already being processed always finishes.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error, info, warn};

use cuentia_db::CfdiStore;

use crate::config::EtlConfig;
use crate::error::{EtlError, EtlResult};
use crate::processor::{EntryOutcome, EntryProcessor};

// =============================================================================
// Options
// =============================================================================

/// Loop parameters, usually taken from [`EtlConfig`].
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub worker_id: String,
    pub batch_size: i64,
    pub idle_backoff: Duration,
    pub claim_lease: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &EtlConfig) -> Self {
        WorkerOptions {
            worker_id: config.worker.id.clone(),
            batch_size: i64::try_from(config.worker.batch_size).unwrap_or(i64::MAX),
            idle_backoff: config.idle_backoff(),
            claim_lease: config.claim_lease(),
        }
    }
}

// =============================================================================
// Batch Statistics
// =============================================================================

/// Counters for one claimed batch, or summed over a worker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub claimed: usize,
    /// Documents committed.
    pub processed: usize,
    pub cancelled: usize,
    /// Entries marked processed with an error annotation.
    pub failed: usize,
    /// Entries whose error mark also failed (left for lease expiry).
    pub unmarked: usize,
    /// Entries handed back at shutdown.
    pub released: usize,
    /// Entries skipped because another worker took the claim over.
    pub lost: usize,
}

impl BatchStats {
    fn record(&mut self, outcome: &EtlResult<EntryOutcome>) {
        match outcome {
            Ok(EntryOutcome::Persisted { .. }) => self.processed += 1,
            Ok(EntryOutcome::Cancelled { .. }) => self.cancelled += 1,
            Ok(EntryOutcome::Failed { .. }) => self.failed += 1,
            Ok(EntryOutcome::ClaimLost) => self.lost += 1,
            Err(_) => self.unmarked += 1,
        }
    }

    /// Adds another batch into this total.
    pub fn absorb(&mut self, other: &BatchStats) {
        self.claimed += other.claimed;
        self.processed += other.processed;
        self.cancelled += other.cancelled;
        self.failed += other.failed;
        self.unmarked += other.unmarked;
        self.released += other.released;
        self.lost += other.lost;
    }
}

/// Lifetime summary returned by [`Worker::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub batches: usize,
    pub claim_errors: usize,
    pub totals: BatchStats,
}

// =============================================================================
// Worker
// =============================================================================

/// Claims and processes queue entries until shut down.
pub struct Worker {
    store: Arc<dyn CfdiStore>,
    processor: EntryProcessor,
    options: WorkerOptions,
    shutdown_rx: mpsc::Receiver<()>,
    stopping: bool,
}

/// Handle for stopping a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl WorkerHandle {
    /// Requests a graceful stop. The current entry finishes first.
    pub async fn shutdown(&self) -> EtlResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EtlError::ChannelError("Worker already stopped".into()))
    }
}

impl Worker {
    /// Creates a worker and its shutdown handle.
    pub fn new(store: Arc<dyn CfdiStore>, options: WorkerOptions) -> (Self, WorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = Worker {
            processor: EntryProcessor::new(store.clone(), options.worker_id.clone()),
            store,
            options,
            shutdown_rx,
            stopping: false,
        };

        (worker, WorkerHandle { shutdown_tx })
    }

    pub fn worker_id(&self) -> &str {
        &self.options.worker_id
    }

    /// Runs the claim loop until shutdown is requested.
    pub async fn run(mut self) -> WorkerReport {
        info!(
            worker_id = %self.options.worker_id,
            batch_size = self.options.batch_size,
            "Worker starting"
        );

        let mut report = WorkerReport::default();

        while !self.shutdown_requested() {
            match self.run_once().await {
                Ok(stats) if stats.claimed == 0 => {
                    debug!("No pending entries");
                    self.idle().await;
                }
                Ok(stats) => {
                    report.batches += 1;
                    report.totals.absorb(&stats);
                    info!(
                        claimed = stats.claimed,
                        processed = stats.processed,
                        cancelled = stats.cancelled,
                        failed = stats.failed,
                        unmarked = stats.unmarked,
                        released = stats.released,
                        lost = stats.lost,
                        "Batch finished"
                    );
                }
                Err(e) => {
                    report.claim_errors += 1;
                    if e.is_transient() {
                        warn!(?e, "Transient error claiming batch, retrying after backoff");
                    } else {
                        error!(?e, "Failed to claim batch");
                    }
                    self.idle().await;
                }
            }
        }

        info!(
            batches = report.batches,
            processed = report.totals.processed,
            cancelled = report.totals.cancelled,
            failed = report.totals.failed,
            "Worker stopped"
        );

        report
    }

    /// Claims one batch and processes it.
    ///
    /// Returns an error only when the claim itself fails; per-entry failures
    /// are counted in the stats. Stops early, releasing the rest of the
    /// batch, when shutdown is requested.
    pub async fn run_once(&mut self) -> EtlResult<BatchStats> {
        let entries = self
            .store
            .claim_batch(
                &self.options.worker_id,
                self.options.batch_size,
                self.options.claim_lease,
            )
            .await?;

        let mut stats = BatchStats {
            claimed: entries.len(),
            ..BatchStats::default()
        };

        for (index, entry) in entries.iter().enumerate() {
            if self.shutdown_requested() {
                let remaining: Vec<i64> = entries[index..].iter().map(|e| e.id).collect();
                stats.released = self.release(&remaining).await;
                break;
            }

            let outcome = self.processor.process(entry).await;
            stats.record(&outcome);
        }

        Ok(stats)
    }

    /// Hands unprocessed claims back to the queue.
    async fn release(&self, ids: &[i64]) -> usize {
        match self.store.release_claims(&self.options.worker_id, ids).await {
            Ok(released) => {
                info!(released, "Released unprocessed claims");
                usize::try_from(released).unwrap_or(usize::MAX)
            }
            Err(e) => {
                warn!(?e, count = ids.len(), "Failed to release claims, they expire with the lease");
                0
            }
        }
    }

    /// Sleeps for the idle backoff unless shutdown arrives first.
    async fn idle(&mut self) {
        if self.stopping {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.options.idle_backoff) => {}
            _ = self.shutdown_rx.recv() => {
                info!("Worker shutting down");
                self.stopping = true;
            }
        }
    }

    /// Non-blocking shutdown check. A dropped handle counts as shutdown.
    fn shutdown_requested(&mut self) -> bool {
        if !self.stopping {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => {
                    info!("Worker shutting down");
                    self.stopping = true;
                }
                Err(TryRecvError::Empty) => {}
            }
        }
        self.stopping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_absorb() {
        let mut total = BatchStats::default();
        let batch = BatchStats {
            claimed: 3,
            processed: 1,
            cancelled: 1,
            failed: 1,
            unmarked: 0,
            released: 0,
            lost: 0,
        };
        total.absorb(&batch);
        total.absorb(&batch);
        assert_eq!(total.claimed, 6);
        assert_eq!(total.processed, 2);
        assert_eq!(total.failed, 2);
    }

    #[test]
    fn test_stats_record() {
        let mut stats = BatchStats::default();
        stats.record(&Ok(EntryOutcome::Failed {
            annotation: "Sin nodo Comprobante".into(),
        }));
        stats.record(&Err(EtlError::ChannelError("x".into())));
        stats.record(&Ok(EntryOutcome::ClaimLost));
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.unmarked, 1);
        assert_eq!(stats.lost, 1);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = EtlConfig::default();
        config.worker.id = "etl-test".into();
        config.worker.batch_size = 50;

        let options = WorkerOptions::from_config(&config);
        assert_eq!(options.worker_id, "etl-test");
        assert_eq!(options.batch_size, 50);
        assert_eq!(options.claim_lease, Duration::from_secs(900));
    }
}
