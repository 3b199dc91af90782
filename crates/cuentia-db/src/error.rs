//! # Database Error Types
//!
//! Error types for store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  PostgreSQL Error (sqlx::Error, SQLSTATE)                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Categorized by SQLSTATE class                 │
//! │       │                                                                 │
//! │       ├── conflict  (23505, 23503, 23514)   → entry marked w/ error    │
//! │       ├── transient (55P03, 40001, 40P01,                              │
//! │       │              pool timeout, I/O)      → claim cycle retried      │
//! │       ├── ClaimLost (queue row not ours)     → skipped, nothing written │
//! │       └── other                              → entry marked w/ error    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EtlError (in etl-worker) ← annotation stored in cfdi_files            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and classify them into persistence
/// conflicts and transient store failures.
#[derive(Debug, Error)]
pub enum DbError {
    /// Row not found where one was required.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The queue entry is no longer claimed by this worker.
    ///
    /// ## When This Occurs
    /// - The claim lease expired and another worker reclaimed the entry
    /// - The entry was already marked processed
    ///
    /// The transaction that hit it is rolled back and nothing is written.
    #[error("Claim on cfdi_files {id} is no longer held by {worker_id}")]
    ClaimLost { id: i64, worker_id: String },

    /// Unique constraint violation (SQLSTATE 23505).
    ///
    /// ## When This Occurs
    /// - Inserting a credit note or header without `ON CONFLICT`
    /// - Any UNIQUE index added later by hand
    #[error("Duplicate value violates '{constraint}': {message}")]
    UniqueViolation { constraint: String, message: String },

    /// Foreign key constraint violation (SQLSTATE 23503).
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Check or NOT NULL constraint violation (SQLSTATE 23514 / 23502).
    #[error("Check violation: {message}")]
    CheckViolation { message: String },

    /// Row lock not available (SQLSTATE 55P03).
    #[error("Lock not available: {0}")]
    LockUnavailable(String),

    /// Serialization failure or deadlock (SQLSTATE 40001 / 40P01).
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Server unreachable or restarting
    /// - Connection dropped mid-query
    /// - Authentication rejected
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed (syntax, type mismatch, ...).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use past the acquire timeout).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a ClaimLost error for a queue entry.
    pub fn claim_lost(id: i64, worker_id: impl Into<String>) -> Self {
        DbError::ClaimLost {
            id,
            worker_id: worker_id.into(),
        }
    }

    /// True when another worker owns the entry now (or it is done).
    pub fn is_claim_lost(&self) -> bool {
        matches!(self, DbError::ClaimLost { .. })
    }

    /// Connection, pool, lock and serialization problems.
    ///
    /// A transient error during a claim aborts only that polling cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::ConnectionFailed(_)
                | DbError::PoolExhausted
                | DbError::LockUnavailable(_)
                | DbError::SerializationFailure(_)
        )
    }

    /// Constraint violations surfaced by the store.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            DbError::UniqueViolation { .. }
                | DbError::ForeignKeyViolation { .. }
                | DbError::CheckViolation { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → SQLSTATE:
///     23505 → UniqueViolation      23503 → ForeignKeyViolation
///     23514 / 23502 → CheckViolation
///     55P03 → LockUnavailable      40001 / 40P01 → SerializationFailure
///     08xxx / 57P0x → ConnectionFailed
///     other → QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::Io / Tls       → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

                match code.as_str() {
                    "23505" => DbError::UniqueViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                        message,
                    },
                    "23503" => DbError::ForeignKeyViolation { message },
                    "23514" | "23502" => DbError::CheckViolation { message },
                    "55P03" => DbError::LockUnavailable(message),
                    "40001" | "40P01" => DbError::SerializationFailure(message),
                    c if c.starts_with("08") || c.starts_with("57P0") => {
                        DbError::ConnectionFailed(message)
                    }
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),

            sqlx::Error::Tls(e) => DbError::ConnectionFailed(e.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
