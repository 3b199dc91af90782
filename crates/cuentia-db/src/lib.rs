//! # cuentia-db: Database Layer for the CuentIA ETL
//!
//! PostgreSQL access for the CFDI ETL: queue claims, per-document
//! transactions and embedded migrations, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CuentIA ETL Data Flow                            │
//! │                                                                         │
//! │  etl-worker (claim → DocumentPlan → persist)                           │
//! │       │                                                                 │
//! │       ▼  dyn CfdiStore                                                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    cuentia-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  queue.rs      │    │  (embedded)  │  │   │
//! │  │   │               │    │  cfdi.rs       │    │              │  │   │
//! │  │   │ PgPool        │◄───│                │    │ 001_init.sql │  │   │
//! │  │   │ CfdiStore impl│    │                │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   PostgreSQL: cfdi_files, cfdis, conceptos_cfdis,               │   │
//! │  │               notas_credito_cfdi, pagos_cfdi                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Queue and CFDI table SQL
//! - [`store`] - The [`CfdiStore`] trait and its Postgres implementation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cuentia_db::{CfdiStore, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new(database_url)).await?;
//! let batch = db.claim_batch("worker-1", 200, Duration::from_secs(900)).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use store::{CfdiStore, PersistOutcome};

// Repository re-exports for convenience
pub use repository::cfdi::CfdiWriter;
pub use repository::queue::{NewQueueEntry, QueueRepository};
