//! # Worker Error Types
//!
//! ## Error Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Per entry (terminal, entry marked processed with annotation)          │
//! │  ├── FileRead          queued path missing or unreadable               │
//! │  ├── Document(..)      MissingRootNode, MissingUuid, ...               │
//! │  └── Store(..)         conflict or failure inside the document tx      │
//! │                                                                         │
//! │  Per entry (skipped, nothing written, nothing marked)                  │
//! │  └── Store(ClaimLost)  lease taken over by another worker              │
//! │                                                                         │
//! │  Per cycle (nothing marked, claim retried after the idle backoff)      │
//! │  └── Store(..)         raised by claim_batch                           │
//! │                                                                         │
//! │  Startup (process exits)                                               │
//! │  ├── InvalidConfig                                                      │
//! │  └── ConfigLoadFailed                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use cuentia_core::{CoreError, SourceKind};
use cuentia_db::DbError;

/// Result type alias for worker operations.
pub type EtlResult<T> = Result<T, EtlError>;

/// Errors raised while running the worker.
#[derive(Debug, Error)]
pub enum EtlError {
    // =========================================================================
    // Per-entry Errors
    // =========================================================================
    /// The queued file could not be read.
    #[error("No se pudo leer {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file did not yield a usable document.
    #[error(transparent)]
    Document(#[from] CoreError),

    /// The store rejected or failed an operation.
    #[error(transparent)]
    Store(#[from] DbError),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid worker configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Shutdown channel closed (the worker already stopped).
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<toml::de::Error> for EtlError {
    fn from(err: toml::de::Error) -> Self {
        EtlError::ConfigLoadFailed(err.to_string())
    }
}

impl EtlError {
    /// One-line text stored in `cfdi_files.error_message`.
    pub fn annotation(&self, source: SourceKind) -> String {
        let text = match (self, source) {
            (EtlError::Document(CoreError::MissingUuid), SourceKind::Cancelled) => {
                "Cancelado sin UUID".to_string()
            }
            _ => self.to_string(),
        };

        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// True when another worker owns the entry now.
    pub fn is_claim_lost(&self) -> bool {
        matches!(self, EtlError::Store(e) if e.is_claim_lost())
    }

    /// Returns true if retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EtlError::Store(e) if e.is_transient())
    }

    /// Short tag for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::FileRead { .. } => "file_read",
            EtlError::Document(e) => e.kind(),
            EtlError::Store(e) if e.is_claim_lost() => "claim_lost",
            EtlError::Store(e) if e.is_conflict() => "persistence_conflict",
            EtlError::Store(e) if e.is_transient() => "transient_store_error",
            EtlError::Store(_) => "store_error",
            EtlError::InvalidConfig(_) | EtlError::ConfigLoadFailed(_) => "config",
            EtlError::ChannelError(_) => "channel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_without_uuid_annotation() {
        let err = EtlError::from(CoreError::MissingUuid);
        assert_eq!(err.annotation(SourceKind::Cancelled), "Cancelado sin UUID");
        assert_eq!(err.annotation(SourceKind::Active), "Sin UUID en el XML");
    }

    #[test]
    fn test_annotation_is_single_line() {
        let err = EtlError::from(CoreError::MalformedXml("line 1\n  unexpected eof".into()));
        let annotation = err.annotation(SourceKind::Active);
        assert!(!annotation.contains('\n'));
        assert_eq!(annotation, "Malformed XML: line 1 unexpected eof");
    }

    #[test]
    fn test_file_read_annotation() {
        let err = EtlError::FileRead {
            path: "/data/a.xml".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.annotation(SourceKind::Active), "No se pudo leer /data/a.xml: not found");
        assert_eq!(err.kind(), "file_read");
    }

    #[test]
    fn test_kinds_and_transience() {
        let transient = EtlError::from(DbError::PoolExhausted);
        assert!(transient.is_transient());
        assert_eq!(transient.kind(), "transient_store_error");

        let conflict = EtlError::from(DbError::CheckViolation { message: "x".into() });
        assert!(!conflict.is_transient());
        assert_eq!(conflict.kind(), "persistence_conflict");

        assert_eq!(EtlError::from(CoreError::MissingRootNode).kind(), "missing_root_node");

        let lost = EtlError::from(DbError::claim_lost(7, "etl-a"));
        assert!(lost.is_claim_lost());
        assert!(!lost.is_transient());
        assert_eq!(lost.kind(), "claim_lost");
    }
}
