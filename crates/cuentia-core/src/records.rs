//! # Persisted Row Shapes
//!
//! One struct per destination table. Builders elsewhere in the crate fill
//! them from a [`Document`](crate::document::Document); `cuentia-db` binds
//! them column by column.
//!
//! ```text
//! ┌──────────────────────┬───────────────────────┬───────────────────────────┐
//! │ Struct               │ Table                 │ Key / conflict rule       │
//! ├──────────────────────┼───────────────────────┼───────────────────────────┤
//! │ HeaderRecord         │ cfdis                 │ uuid, ON CONFLICT NOTHING │
//! │ LineItemRecord       │ conceptos_cfdis       │ serial, always inserted   │
//! │ CreditNoteRecord     │ notas_credito_cfdi    │ uuid_nota, ON CONFLICT .. │
//! │ PaymentRecord        │ pagos_cfdi            │ serial, always inserted   │
//! └──────────────────────┴───────────────────────┴───────────────────────────┘
//! ```
//!
//! Field names are English; the Spanish column each one lands in is kept in
//! the SQL of the repositories, which is the reporting contract.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::tax::TaxTotals;
use crate::types::{Movement, RecordStatus};

// =============================================================================
// Header
// =============================================================================

/// One `cfdis` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderRecord {
    pub uuid: String,
    pub version: String,
    pub issuer_rfc: String,
    pub issuer_name: String,
    pub recipient_rfc: String,
    pub recipient_name: String,
    pub issued_at: Option<NaiveDateTime>,
    pub voucher_type: String,
    pub series: String,
    pub folio: String,
    pub status: RecordStatus,
    pub payment_method: String,
    /// `FormaPago`, stored in `tipopago`.
    pub payment_form: String,
    pub issuer_regime: String,
    pub expedition_place: String,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub taxes: TaxTotals,
    pub cfdi_use: String,
    pub currency: String,
    pub movement: Movement,
    pub processed_at: NaiveDateTime,
    pub recipient_regime: String,
    /// Counterparty: recipient for income, issuer for expense, empty otherwise.
    pub counterparty_rfc: String,
    /// Queue origin tag (`fuente`).
    pub source: String,
    pub owner_rfc: String,
    pub category: String,
    pub exchange_rate: Decimal,
}

// =============================================================================
// Line Item
// =============================================================================

/// One `conceptos_cfdis` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItemRecord {
    /// 1-based position within the document. Not unique across replays.
    pub line_number: i32,
    pub product_key: String,
    pub quantity: Decimal,
    pub unit_key: String,
    pub unit: String,
    pub description: String,
    pub unit_value: Decimal,
    pub amount: Decimal,
    pub discount: Option<Decimal>,
    pub cfdi_uuid: String,
    pub owner_rfc: String,
    pub issued_on: Option<NaiveDate>,
    /// Movement tag truncated to 10 characters.
    pub movement_tag: String,
}

// =============================================================================
// Credit Note
// =============================================================================

/// One `notas_credito_cfdi` row. Amounts are already negated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditNoteRecord {
    pub uuid: String,
    pub related_invoice_uuid: Option<String>,
    pub relation_type: Option<String>,
    pub issued_at: Option<NaiveDateTime>,
    pub issuer_rfc: String,
    pub issuer_name: String,
    pub issuer_regime: String,
    pub recipient_rfc: String,
    pub recipient_name: String,
    pub recipient_regime: String,
    pub subtotal: Decimal,
    pub vat_8: Decimal,
    pub vat_16: Decimal,
    pub total_transferred: Decimal,
    pub withheld_isr: Decimal,
    pub withheld_vat: Decimal,
    pub total_withheld: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub payment_form: String,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub voucher_type: String,
    pub payment_method: String,
    pub owner_rfc: String,
    pub status: RecordStatus,
}

// =============================================================================
// Payment
// =============================================================================

/// `base / importe / tipo_factor / tasa_cuota` columns of one VAT rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateColumns {
    pub base: Decimal,
    pub amount: Decimal,
    pub factor_type: String,
    pub rate: Decimal,
}

/// Per-document tax breakdown of payments complement 2.0 (`ImpuestosDR`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaidDocumentTaxes {
    pub total_transferred: Decimal,
    pub total_withheld: Decimal,
    pub rate_16: Option<RateColumns>,
    pub rate_8: Option<RateColumns>,
    pub exempt_base: Option<Decimal>,
    pub exempt_tax: Option<String>,
    pub exempt_factor: Option<String>,
    /// Tax code of the first withholding.
    pub withheld_tax: Option<String>,
    pub withheld_amount: Option<Decimal>,
}

/// Related-invoice columns of a payment row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaidInvoiceColumns {
    pub invoice_uuid: Option<String>,
    pub series: String,
    pub folio: String,
    pub currency: String,
    pub equivalence: Decimal,
    pub installment: Option<i32>,
    pub previous_balance: Decimal,
    pub amount_paid: Decimal,
    pub outstanding_balance: Decimal,
    pub tax_object: String,
    pub payment_method: Option<String>,
    /// `None` for complement 1.0 documents (no `ImpuestosDR`).
    pub taxes: Option<PaidDocumentTaxes>,
}

/// One `pagos_cfdi` row: a (payment event × related invoice) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub issued_at: Option<NaiveDateTime>,
    pub complement_uuid: String,
    pub issuer_rfc: String,
    pub issuer_name: String,
    pub issuer_regime: String,
    pub recipient_rfc: String,
    pub recipient_name: String,
    pub recipient_regime: String,
    pub paid_at: Option<NaiveDateTime>,
    pub payment_form: String,
    pub currency: String,
    pub exchange_rate: Decimal,
    pub amount: Decimal,
    pub operation_number: String,
    pub payer_rfc: String,
    pub payer_bank: String,
    pub payer_account: String,
    pub payee_rfc: String,
    pub payee_account: String,
    /// `None` when the payment event lists no related invoice.
    pub invoice: Option<PaidInvoiceColumns>,
    pub owner_rfc: String,
    pub status: RecordStatus,
}

impl PaymentRecord {
    /// Voucher type column, always `P`.
    pub const VOUCHER_TYPE: &'static str = "P";
}
