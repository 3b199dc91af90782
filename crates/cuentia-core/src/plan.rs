//! # Document Plan
//!
//! Everything one queue entry will write, decided before any I/O.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  (QueueEntry, Document)                                                 │
//! │         │                                                               │
//! │         ├── SourceKind::Cancelled ──► CancellationTarget::resolve       │
//! │         │                              P → pagos_cfdi                   │
//! │         │                              E → notas_credito_cfdi           │
//! │         │                              * → cfdis                        │
//! │         │                                                               │
//! │         └── Active ──► DocumentPlan::build                               │
//! │                 1. VoucherType (I/E/T/N/P or UnsupportedDocumentType)   │
//! │                 2. classify(owner)                                      │
//! │                 3. E: negate amounts (once)                             │
//! │                 4. TaxTotals::compute                                   │
//! │                 5. header + lines (+ credit note | + payments)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The plan is applied by the store in ONE transaction, ending with the
//! queue entry being marked processed.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::classify::classify;
use crate::document::Document;
use crate::error::CoreResult;
use crate::expansion::{credit_note_record, payment_records};
use crate::records::{CreditNoteRecord, HeaderRecord, LineItemRecord, PaymentRecord};
use crate::tax::TaxTotals;
use crate::types::{Movement, QueueEntry, RecordStatus, VoucherType};

// =============================================================================
// Warnings
// =============================================================================

/// Non-fatal anomalies found while planning. The worker logs them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlanWarning {
    /// Movement is `Unknown` or `UnknownPayroll`.
    NeedsReview(Movement),
    /// Payment complement without a `Pagos` node; no payment rows written.
    MissingPaymentsNode,
    /// Declared `TotalImpuestosTrasladados` differs from the computed total.
    TransferredTaxMismatch {
        declared: Decimal,
        computed: Decimal,
    },
}

// =============================================================================
// Document Plan
// =============================================================================

/// Rows produced by one active (non-cancelled) document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentPlan {
    pub voucher_type: VoucherType,
    pub header: HeaderRecord,
    pub lines: Vec<LineItemRecord>,
    pub credit_note: Option<CreditNoteRecord>,
    pub payments: Vec<PaymentRecord>,
    pub warnings: Vec<PlanWarning>,
}

impl DocumentPlan {
    /// Builds the plan for an active document.
    ///
    /// `processed_at` is passed in so this stays clock-free.
    ///
    /// ## Errors
    /// * `UnsupportedDocumentType` - type code outside I/E/T/N/P
    /// * `MissingUuid` - no stamp UUID and no raw `UUID="..."`
    pub fn build(
        entry: &QueueEntry,
        mut document: Document,
        processed_at: NaiveDateTime,
    ) -> CoreResult<Self> {
        let voucher_type = document.voucher_type()?;
        let uuid = document.require_uuid()?.to_string();
        let owner = entry.rfc.as_str();

        let movement = classify(
            voucher_type,
            &document.issuer.rfc,
            &document.recipient.rfc,
            owner,
        );

        let mut warnings = Vec::new();
        if movement.needs_review() {
            warnings.push(PlanWarning::NeedsReview(movement));
        }

        if voucher_type == VoucherType::CreditNote {
            document.negate_for_credit_note();
        }

        let totals = TaxTotals::compute(&document.line_items);
        if let Some(declared) = document.declared_taxes.transferred {
            if totals.transferred_gap(Some(declared)).is_some() {
                warnings.push(PlanWarning::TransferredTaxMismatch {
                    declared,
                    computed: totals.total_transferred,
                });
            }
        }

        let lines = line_records(&document, &uuid, owner, movement);

        let credit_note = (voucher_type == VoucherType::CreditNote)
            .then(|| credit_note_record(&document, &uuid, &totals, owner));

        let payments = if voucher_type == VoucherType::PaymentComplement {
            payment_records(&document, &uuid, owner).unwrap_or_else(|| {
                warnings.push(PlanWarning::MissingPaymentsNode);
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let header = header_record(&document, uuid, totals, movement, entry, processed_at);

        Ok(DocumentPlan {
            voucher_type,
            header,
            lines,
            credit_note,
            payments,
            warnings,
        })
    }

    pub fn uuid(&self) -> &str {
        &self.header.uuid
    }
}

fn header_record(
    document: &Document,
    uuid: String,
    taxes: TaxTotals,
    movement: Movement,
    entry: &QueueEntry,
    processed_at: NaiveDateTime,
) -> HeaderRecord {
    let counterparty_rfc = match movement {
        Movement::Income => document.recipient.rfc.clone(),
        Movement::Expense => document.issuer.rfc.clone(),
        _ => String::new(),
    };

    HeaderRecord {
        uuid,
        version: document.version.clone(),
        issuer_rfc: document.issuer.rfc.clone(),
        issuer_name: document.issuer.name.clone(),
        recipient_rfc: document.recipient.rfc.clone(),
        recipient_name: document.recipient.name.clone(),
        issued_at: document.issued_at,
        voucher_type: document.type_code.clone(),
        series: document.series.clone(),
        folio: document.folio.clone(),
        status: RecordStatus::Vigente,
        payment_method: document.payment_method.clone(),
        payment_form: document.payment_form.clone(),
        issuer_regime: document.issuer.tax_regime.clone(),
        expedition_place: document.expedition_place.clone(),
        subtotal: document.subtotal,
        discount: document.discount,
        total: document.total,
        taxes,
        cfdi_use: document.recipient.cfdi_use.clone(),
        currency: document.currency.clone(),
        movement,
        processed_at,
        recipient_regime: document.recipient.tax_regime.clone(),
        counterparty_rfc,
        source: entry.origen.clone(),
        owner_rfc: entry.rfc.clone(),
        category: String::new(),
        exchange_rate: document.exchange_rate,
    }
}

fn line_records(
    document: &Document,
    uuid: &str,
    owner: &str,
    movement: Movement,
) -> Vec<LineItemRecord> {
    let issued_on = document.issued_on();
    let movement_tag = movement.line_tag();

    document
        .line_items
        .iter()
        .enumerate()
        .map(|(index, line)| LineItemRecord {
            line_number: i32::try_from(index + 1).unwrap_or(i32::MAX),
            product_key: line.product_key.clone(),
            quantity: line.quantity,
            unit_key: line.unit_key.clone(),
            unit: line.unit.clone(),
            description: line.description.clone(),
            unit_value: line.unit_value,
            amount: line.amount,
            discount: line.discount,
            cfdi_uuid: uuid.to_string(),
            owner_rfc: owner.to_string(),
            issued_on,
            movement_tag: movement_tag.clone(),
        })
        .collect()
}

// =============================================================================
// Cancellation Target
// =============================================================================

/// Table row a cancellation notice flips to `Cancelado`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CancellationTarget {
    /// `pagos_cfdi` by `(uuid_complemento, rfc_relacionado)`; may match many rows.
    Payment { uuid: String, owner_rfc: String },
    /// `notas_credito_cfdi` by `(uuid_nota, rfc_relacionado)`.
    CreditNote { uuid: String, owner_rfc: String },
    /// `cfdis` by `(uuid, rfc_relacionado)`; also sets `categoria = 'cancelado'`.
    Header { uuid: String, owner_rfc: String },
}

impl CancellationTarget {
    /// Picks the table from the type code. Unknown codes fall back to the header.
    ///
    /// ## Errors
    /// * `MissingUuid` - the cancelled document cannot be identified
    pub fn resolve(entry: &QueueEntry, document: &Document) -> CoreResult<Self> {
        let uuid = document.require_uuid()?.to_string();
        let owner_rfc = entry.rfc.clone();

        Ok(match VoucherType::from_code(&document.type_code) {
            Ok(VoucherType::PaymentComplement) => CancellationTarget::Payment { uuid, owner_rfc },
            Ok(VoucherType::CreditNote) => CancellationTarget::CreditNote { uuid, owner_rfc },
            _ => CancellationTarget::Header { uuid, owner_rfc },
        })
    }

    pub fn uuid(&self) -> &str {
        match self {
            CancellationTarget::Payment { uuid, .. }
            | CancellationTarget::CreditNote { uuid, .. }
            | CancellationTarget::Header { uuid, .. } => uuid,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            CancellationTarget::Payment { .. } => "pagos_cfdi",
            CancellationTarget::CreditNote { .. } => "notas_credito_cfdi",
            CancellationTarget::Header { .. } => "cfdis",
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
