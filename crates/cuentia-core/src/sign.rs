//! # Credit-Note Sign Convention
//!
//! Egreso documents (`E`) are stored with every monetary amount negated so
//! that summing a column across income and credit notes yields the net.
//!
//! ```text
//!   parsed (positive)                  after negate_for_credit_note()
//!   SubTotal  1000.00          ──►     -1000.00
//!   Traslado  Importe 160.00   ──►     -160.00
//!   Retencion Importe 100.00   ──►     -100.00
//! ```
//!
//! The negation is numeric (`-x`), so `0` stays `0` and an already negative
//! attribute flips to positive. [`DocumentPlan::build`](crate::plan::DocumentPlan::build)
//! is the only caller and consumes the document, so each parsed document is
//! negated exactly once. A replayed file is a fresh parse whose header insert
//! is a no-op on the UUID key.

use rust_decimal::Decimal;

use crate::document::{Document, LineItem, TaxLine};

impl Document {
    /// Negates every monetary amount in place.
    pub(crate) fn negate_for_credit_note(&mut self) {
        negate(&mut self.subtotal);
        negate(&mut self.total);
        negate(&mut self.discount);
        negate_opt(&mut self.declared_taxes.transferred);
        negate_opt(&mut self.declared_taxes.withheld);

        self.line_items.iter_mut().for_each(negate_line);
    }
}

fn negate_line(line: &mut LineItem) {
    negate(&mut line.unit_value);
    negate(&mut line.amount);
    negate_opt(&mut line.discount);

    line.transferred
        .iter_mut()
        .chain(line.withheld.iter_mut())
        .for_each(negate_tax);
}

fn negate_tax(tax: &mut TaxLine) {
    negate(&mut tax.base);
    negate(&mut tax.amount);
}

fn negate(value: &mut Decimal) {
    // -0 would render as "-0" in reports
    if !value.is_zero() {
        *value = -*value;
    }
}

fn negate_opt(value: &mut Option<Decimal>) {
    if let Some(v) = value.as_mut() {
        negate(v);
    }
}
