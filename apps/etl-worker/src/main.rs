//! # CuentIA ETL Worker
//!
//! Long-running queue worker. Start as many processes as needed against the
//! same database; claims never overlap.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  EtlConfig::load ──► tracing init ──► Database::new (+ migrations)     │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  spawn Worker::run  (span: worker{worker_id})                           │
//! │        │                                                                │
//! │  Ctrl+C / SIGTERM ──► handle.shutdown ──► await report ──► pool close  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use cuentia_db::{CfdiStore, Database};
use etl_worker::config::LoggingSettings;
use etl_worker::{EtlConfig, LogFormat, Worker, WorkerOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EtlConfig::load(None).context("loading worker configuration")?;

    init_tracing(&config.logging);

    info!(
        worker_id = %config.worker.id,
        batch_size = config.worker.batch_size,
        idle_backoff_secs = config.worker.idle_backoff_secs,
        claim_lease_secs = config.worker.claim_lease_secs,
        "Starting CuentIA ETL worker"
    );

    let db = Database::new(config.db_config())
        .await
        .context("connecting to PostgreSQL")?;
    info!("Connected to PostgreSQL");

    match db.queue().pending_count().await {
        Ok(pending) => info!(pending, "Queue backlog"),
        Err(e) => warn!(?e, "Could not count pending entries"),
    }

    let store: Arc<dyn CfdiStore> = Arc::new(db.clone());
    let (worker, handle) = Worker::new(store, WorkerOptions::from_config(&config));

    let span = info_span!("worker", worker_id = %config.worker.id);
    let task = tokio::spawn(worker.run().instrument(span));

    shutdown_signal().await;

    if let Err(e) = handle.shutdown().await {
        warn!(?e, "Worker had already stopped");
    }

    let report = task.await.context("worker task panicked")?;
    info!(
        batches = report.batches,
        processed = report.totals.processed,
        cancelled = report.totals.cancelled,
        failed = report.totals.failed,
        claim_errors = report.claim_errors,
        "Worker shutdown complete"
    );

    db.close().await;
    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured filter.
fn init_tracing(logging: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(?e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, finishing current entry...");
}
