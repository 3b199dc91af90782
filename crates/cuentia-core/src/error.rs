//! # Error Types
//!
//! Document-level error types for cuentia-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  cuentia-core errors (this file)                                       │
//! │  └── CoreError        - A queued XML file cannot become a Document     │
//! │                                                                         │
//! │  cuentia-db errors (separate crate)                                    │
//! │  └── DbError          - Store failures (conflicts, transient issues)   │
//! │                                                                         │
//! │  etl-worker errors (in app)                                            │
//! │  └── EtlError         - What ends up in cfdi_files.error_message       │
//! │                                                                         │
//! │  Flow: CoreError → EtlError → mark_processed(id, Some(annotation))     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every `CoreError` is terminal for its queue entry: the entry is marked
//! processed with the error annotation and never retried automatically.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Reasons a queued XML file cannot be turned into a persisted CFDI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The file is not well-formed XML.
    #[error("Malformed XML: {0}")]
    MalformedXml(String),

    /// The top-level `Comprobante` element is absent.
    ///
    /// ## When This Occurs
    /// - Empty file
    /// - Another SAT document (e.g. `Retenciones`) landed in the queue
    #[error("Sin nodo Comprobante")]
    MissingRootNode,

    /// Neither the fiscal stamp nor a raw `UUID="..."` attribute yields a UUID.
    #[error("Sin UUID en el XML")]
    MissingUuid,

    /// `TipoDeComprobante` is absent or outside the SAT catalog (I, E, T, N, P).
    #[error("Tipo de comprobante no soportado: '{0}'")]
    UnsupportedDocumentType(String),
}

impl CoreError {
    /// Short machine-friendly tag, used as a structured logging field.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::MalformedXml(_) => "malformed_xml",
            CoreError::MissingRootNode => "missing_root_node",
            CoreError::MissingUuid => "missing_uuid",
            CoreError::UnsupportedDocumentType(_) => "unsupported_document_type",
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
