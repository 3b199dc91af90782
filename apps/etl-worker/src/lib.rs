//! # etl-worker: CFDI Queue Worker
//!
//! Claims `cfdi_files` entries, turns each XML file into rows through
//! `cuentia-core`, and commits them through a [`cuentia_db::CfdiStore`].
//!
//! ## Module Organization
//!
//! - [`config`] - `EtlConfig`: defaults, TOML file, environment overrides
//! - [`processor`] - One entry to its terminal state
//! - [`worker`] - The claim loop and its shutdown handle
//! - [`error`] - Worker error types and queue annotations
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = EtlConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let (worker, handle) = Worker::new(Arc::new(db), WorkerOptions::from_config(&config));
//! let task = tokio::spawn(worker.run());
//! // ...
//! handle.shutdown().await?;
//! let report = task.await?;
//! ```

pub mod config;
pub mod error;
pub mod processor;
pub mod worker;

pub use config::{EtlConfig, LogFormat};
pub use error::{EtlError, EtlResult};
pub use processor::{EntryOutcome, EntryProcessor};
pub use worker::{BatchStats, Worker, WorkerHandle, WorkerOptions, WorkerReport};
