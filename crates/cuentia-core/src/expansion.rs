//! # Credit-Note & Payment Expansion
//!
//! Secondary rows derived from `E` and `P` documents.
//!
//! ## Payment Fan-out
//! ```text
//!   Pagos
//!   ├── Pago #1 ── DoctoRelacionado A  ──►  row (Pago #1, A)
//!   │          └── DoctoRelacionado B  ──►  row (Pago #1, B)
//!   └── Pago #2 (no documents)         ──►  row (Pago #2, NULL invoice)
//! ```
//!
//! A payment event is never dropped: with zero related invoices it still
//! yields one row whose invoice and tax columns are all NULL.

use rust_decimal::Decimal;

use crate::document::{Document, PaidDocument, PaymentEvent};
use crate::money::VatBucket;
use crate::records::{
    CreditNoteRecord, PaidDocumentTaxes, PaidInvoiceColumns, PaymentRecord, RateColumns,
};
use crate::tax::{TaxTotals, TAX_IVA};
use crate::types::RecordStatus;

// =============================================================================
// Credit Note
// =============================================================================

/// Builds the `notas_credito_cfdi` row.
///
/// Expects `document` already negated and `totals` computed from it.
pub fn credit_note_record(
    document: &Document,
    uuid: &str,
    totals: &TaxTotals,
    owner_rfc: &str,
) -> CreditNoteRecord {
    let related = document.first_related();

    CreditNoteRecord {
        uuid: uuid.to_string(),
        related_invoice_uuid: related.map(|r| r.uuid.clone()),
        relation_type: related
            .map(|r| r.relation_type.clone())
            .filter(|kind| !kind.is_empty()),
        issued_at: document.issued_at,
        issuer_rfc: document.issuer.rfc.clone(),
        issuer_name: document.issuer.name.clone(),
        issuer_regime: document.issuer.tax_regime.clone(),
        recipient_rfc: document.recipient.rfc.clone(),
        recipient_name: document.recipient.name.clone(),
        recipient_regime: document.recipient.tax_regime.clone(),
        subtotal: document.subtotal,
        vat_8: totals.vat_8,
        vat_16: totals.vat_16,
        total_transferred: totals.total_transferred,
        withheld_isr: totals.withheld_isr,
        withheld_vat: totals.withheld_vat,
        total_withheld: totals.total_withheld,
        discount: document.discount,
        total: document.total,
        payment_form: document.payment_form.clone(),
        currency: document.currency.clone(),
        exchange_rate: document.exchange_rate,
        voucher_type: document.type_code.clone(),
        payment_method: document.payment_method.clone(),
        owner_rfc: owner_rfc.to_string(),
        status: RecordStatus::Vigente,
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Expands the payments complement into rows.
///
/// Returns `None` when the document has no `Pagos` node at all.
pub fn payment_records(
    document: &Document,
    uuid: &str,
    owner_rfc: &str,
) -> Option<Vec<PaymentRecord>> {
    let events = document.payments.as_ref()?;

    let rows = events
        .iter()
        .flat_map(|event| {
            let invoices: Vec<Option<PaidInvoiceColumns>> = if event.documents.is_empty() {
                vec![None]
            } else {
                event.documents.iter().map(|doc| Some(invoice_columns(doc))).collect()
            };

            invoices
                .into_iter()
                .map(move |invoice| payment_row(document, event, uuid, owner_rfc, invoice))
        })
        .collect();

    Some(rows)
}

fn payment_row(
    document: &Document,
    event: &PaymentEvent,
    uuid: &str,
    owner_rfc: &str,
    invoice: Option<PaidInvoiceColumns>,
) -> PaymentRecord {
    PaymentRecord {
        issued_at: document.issued_at,
        complement_uuid: uuid.to_string(),
        issuer_rfc: document.issuer.rfc.clone(),
        issuer_name: document.issuer.name.clone(),
        issuer_regime: document.issuer.tax_regime.clone(),
        recipient_rfc: document.recipient.rfc.clone(),
        recipient_name: document.recipient.name.clone(),
        recipient_regime: document.recipient.tax_regime.clone(),
        paid_at: event.paid_at,
        payment_form: event.payment_form.clone(),
        currency: event.currency.clone(),
        exchange_rate: event.exchange_rate,
        amount: event.amount,
        operation_number: event.operation_number.clone(),
        payer_rfc: event.payer_rfc.clone(),
        payer_bank: event.payer_bank.clone(),
        payer_account: event.payer_account.clone(),
        payee_rfc: event.payee_rfc.clone(),
        payee_account: event.payee_account.clone(),
        invoice,
        owner_rfc: owner_rfc.to_string(),
        status: RecordStatus::Vigente,
    }
}

fn invoice_columns(doc: &PaidDocument) -> PaidInvoiceColumns {
    let has_taxes = !doc.transferred.is_empty() || !doc.withheld.is_empty();

    PaidInvoiceColumns {
        invoice_uuid: doc.uuid.clone(),
        series: doc.series.clone(),
        folio: doc.folio.clone(),
        currency: doc.currency.clone(),
        equivalence: doc.equivalence,
        installment: doc.installment,
        previous_balance: doc.previous_balance,
        amount_paid: doc.amount_paid,
        outstanding_balance: doc.outstanding_balance,
        tax_object: doc.tax_object.clone(),
        payment_method: doc.payment_method.clone(),
        taxes: has_taxes.then(|| paid_document_taxes(doc)),
    }
}

/// Buckets `TrasladoDR` / `RetencionDR` with the same VAT windows as headers.
fn paid_document_taxes(doc: &PaidDocument) -> PaidDocumentTaxes {
    let mut taxes = PaidDocumentTaxes::default();

    for tax in &doc.transferred {
        taxes.total_transferred += tax.amount;

        if tax.tax_code != TAX_IVA {
            continue;
        }

        let slot = match VatBucket::classify(&tax.factor_type, tax.rate) {
            VatBucket::Sixteen => &mut taxes.rate_16,
            VatBucket::Eight => &mut taxes.rate_8,
            VatBucket::Exempt => {
                *taxes.exempt_base.get_or_insert(Decimal::ZERO) += tax.base;
                taxes.exempt_tax.get_or_insert_with(|| tax.tax_code.clone());
                taxes.exempt_factor.get_or_insert_with(|| tax.factor_type.clone());
                continue;
            }
            VatBucket::Zero | VatBucket::Unbucketed => continue,
        };

        let columns = slot.get_or_insert_with(|| RateColumns {
            factor_type: tax.factor_type.clone(),
            rate: tax.rate,
            ..Default::default()
        });
        columns.base += tax.base;
        columns.amount += tax.amount;
    }

    for tax in &doc.withheld {
        taxes.total_withheld += tax.amount;
        taxes.withheld_tax.get_or_insert_with(|| tax.tax_code.clone());
        *taxes.withheld_amount.get_or_insert(Decimal::ZERO) += tax.amount;
    }

    taxes
}

// =============================================================================
// Unit Tests
// =============================================================================
