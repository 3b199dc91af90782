//! # Domain Types
//!
//! Core domain types shared by the normalizer, the database layer and the worker.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   QueueEntry    │   │   VoucherType   │   │    Movement     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  Income     (I) │   │  Ingreso        │       │
//! │  │  rfc (owner)    │   │  CreditNote (E) │   │  Egreso         │       │
//! │  │  uuid?          │   │  Transfer   (T) │   │  Complemento..  │       │
//! │  │  file_path      │   │  Payroll    (N) │   │  Nómina Desc..  │       │
//! │  └─────────────────┘   │  Payment    (P) │   │  Desconocido    │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │  RecordStatus   │   │   SourceKind    │                             │
//! │  │  Vigente        │   │  Active         │  ← derived from the path    │
//! │  │  Cancelado      │   │  Cancelled      │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Queue Entry
// =============================================================================

/// One row of the `cfdi_files` queue, as handed to a worker after a claim.
///
/// Created by the external ingesters (browser scraper, bulk-download
/// web service); the worker only ever marks it processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct QueueEntry {
    pub id: i64,

    /// RFC of the taxpayer whose download produced this file ("owner").
    pub rfc: String,

    /// UUID as registered by the ingester (may be absent before parsing).
    pub uuid: Option<String>,

    pub fecha_emision: Option<NaiveDate>,

    /// Origin tag: `scraper`, `webservice`, ...
    pub origen: String,

    pub file_path: String,
}

impl QueueEntry {
    /// Returns whether the file came from a cancelled-documents folder.
    pub fn source_kind(&self) -> SourceKind {
        SourceKind::from_path(&self.file_path)
    }
}

// =============================================================================
// Source Kind
// =============================================================================

/// Directory segment the ingesters use for cancelled documents.
pub const CANCELLED_SEGMENT: &str = "cancelados";

/// Whether a queued file is a live document or a cancellation notice.
///
/// ## Why the Path?
/// The XML of a cancelled CFDI is byte-identical to the original; the only
/// signal is where the ingester stored it. The flag is computed once from the
/// queue entry and travels beside the content, never re-derived from XML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Active,
    Cancelled,
}

impl SourceKind {
    /// Detects a `cancelados` directory segment with either path separator.
    pub fn from_path(path: &str) -> Self {
        let segments: Vec<&str> = path.split(['/', '\\']).collect();
        let directories = &segments[..segments.len().saturating_sub(1)];

        if directories.iter().any(|segment| *segment == CANCELLED_SEGMENT) {
            SourceKind::Cancelled
        } else {
            SourceKind::Active
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceKind::Cancelled)
    }
}

// =============================================================================
// Voucher Type
// =============================================================================

/// `TipoDeComprobante` from the SAT catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    /// `I` - Ingreso
    Income,
    /// `E` - Egreso (credit note)
    CreditNote,
    /// `T` - Traslado
    Transfer,
    /// `N` - Nómina
    Payroll,
    /// `P` - Pago (payment complement)
    PaymentComplement,
}

impl VoucherType {
    /// Parses the one-letter code, case-insensitively.
    pub fn from_code(code: &str) -> CoreResult<Self> {
        match code.trim().to_uppercase().as_str() {
            "I" => Ok(VoucherType::Income),
            "E" => Ok(VoucherType::CreditNote),
            "T" => Ok(VoucherType::Transfer),
            "N" => Ok(VoucherType::Payroll),
            "P" => Ok(VoucherType::PaymentComplement),
            _ => Err(CoreError::UnsupportedDocumentType(code.to_string())),
        }
    }

    /// The one-letter code persisted in `tipocomprobante`.
    pub fn code(&self) -> &'static str {
        match self {
            VoucherType::Income => "I",
            VoucherType::CreditNote => "E",
            VoucherType::Transfer => "T",
            VoucherType::Payroll => "N",
            VoucherType::PaymentComplement => "P",
        }
    }
}

impl std::fmt::Display for VoucherType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Movement
// =============================================================================

/// Direction of a document relative to the owner RFC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    Income,
    Expense,
    PaymentComplement,
    /// Payroll where the owner is neither employer nor employee.
    UnknownPayroll,
    /// Self-issued or unrelated document.
    Unknown,
}

impl Movement {
    /// The tag stored in `cfdis.movimiento`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Movement::Income => "Ingreso",
            Movement::Expense => "Egreso",
            Movement::PaymentComplement => "Complemento Pago",
            Movement::UnknownPayroll => "Nómina Desconocida",
            Movement::Unknown => "Desconocido",
        }
    }

    /// The tag stored in `conceptos_cfdis.movimiento` (first 10 characters).
    pub fn line_tag(&self) -> String {
        self.as_str().chars().take(10).collect()
    }

    /// Whether the document needs manual review.
    pub fn needs_review(&self) -> bool {
        matches!(self, Movement::UnknownPayroll | Movement::Unknown)
    }
}

impl std::fmt::Display for Movement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Record Status
// =============================================================================

/// SAT status of a persisted header, credit note or payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordStatus {
    #[default]
    Vigente,
    Cancelado,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Vigente => "Vigente",
            RecordStatus::Cancelado => "Cancelado",
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_unix_and_windows_paths() {
        assert_eq!(
            SourceKind::from_path("/data/AAA010101AAA/cancelados/2024/x.xml"),
            SourceKind::Cancelled
        );
        assert_eq!(
            SourceKind::from_path("C:\\cfdi\\AAA010101AAA\\cancelados\\x.xml"),
            SourceKind::Cancelled
        );
        assert_eq!(
            SourceKind::from_path("/data/AAA010101AAA/emitidos/x.xml"),
            SourceKind::Active
        );
    }

    #[test]
    fn test_source_kind_requires_whole_directory_segment() {
        assert_eq!(
            SourceKind::from_path("/data/no_cancelados/x.xml"),
            SourceKind::Active
        );
        // The file name itself is not a directory segment.
        assert_eq!(SourceKind::from_path("/data/cancelados"), SourceKind::Active);
    }

    #[test]
    fn test_voucher_type_codes() {
        assert_eq!(VoucherType::from_code("i").unwrap(), VoucherType::Income);
        assert_eq!(VoucherType::from_code("E").unwrap(), VoucherType::CreditNote);
        assert_eq!(VoucherType::from_code(" P ").unwrap(), VoucherType::PaymentComplement);
        assert_eq!(VoucherType::Payroll.code(), "N");
        assert!(matches!(
            VoucherType::from_code(""),
            Err(CoreError::UnsupportedDocumentType(_))
        ));
        assert!(VoucherType::from_code("X").is_err());
    }

    #[test]
    fn test_movement_tags() {
        assert_eq!(Movement::Income.as_str(), "Ingreso");
        assert_eq!(Movement::PaymentComplement.line_tag(), "Complement");
        assert_eq!(Movement::UnknownPayroll.line_tag(), "Nómina Des");
        assert_eq!(Movement::Expense.line_tag(), "Egreso");
        assert!(Movement::Unknown.needs_review());
        assert!(!Movement::Income.needs_review());
    }
}
