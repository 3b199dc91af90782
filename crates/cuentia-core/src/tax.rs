//! # Tax Aggregation Engine
//!
//! Walks every line item's `Traslado` / `Retencion` sub-records once and
//! produces the per-document [`TaxTotals`] persisted on the header row.
//!
//! ## Aggregation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TRANSFERRED (Traslado)                                                 │
//! │    002 IVA  ──► transferred_vat += amount, total_transferred += amount  │
//! │                 └── VatBucket::classify(TipoFactor, TasaOCuota)         │
//! │                       Exempt     → base_exempt += base, vat_exempt      │
//! │                       Sixteen    → base_16 += base, vat_16 += amount    │
//! │                       Eight      → base_8  += base, vat_8  += amount    │
//! │                       Zero       → base_0  += base, vat_0  += amount    │
//! │                       Unbucketed → vat_unbucketed (not persisted)       │
//! │    003 IEPS ──► transferred_ieps += amount, total_transferred += amount │
//! │    other    ──► ignored                                                 │
//! │                                                                         │
//! │  WITHHELD (Retencion)                                                   │
//! │    002 → withheld_vat   001 → withheld_isr   003 → withheld_ieps        │
//! │    every code           → total_withheld                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Buckets are only ever summed from line items, never back-solved from the
//! declared document totals. A rate outside every bucket (e.g. border-zone
//! 10.67%) still counts toward `transferred_vat` but toward no rate bucket;
//! `vat_unbucketed` keeps it visible for logging.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::document::LineItem;
use crate::money::VatBucket;

pub const TAX_ISR: &str = "001";
pub const TAX_IVA: &str = "002";
pub const TAX_IEPS: &str = "003";

/// Tolerance for the declared-vs-computed reconciliation check.
pub const RECONCILIATION_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Per-document tax aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxTotals {
    pub withheld_vat: Decimal,
    pub withheld_ieps: Decimal,
    pub withheld_isr: Decimal,
    pub total_withheld: Decimal,

    pub transferred_vat: Decimal,
    pub transferred_ieps: Decimal,
    pub total_transferred: Decimal,

    pub vat_16: Decimal,
    pub vat_exempt: Decimal,
    pub vat_0: Decimal,
    pub vat_8: Decimal,
    pub vat_unbucketed: Decimal,

    pub base_0: Decimal,
    pub base_8: Decimal,
    pub base_16: Decimal,
    pub base_exempt: Decimal,
}

impl TaxTotals {
    /// Single pass over all line items.
    pub fn compute(lines: &[LineItem]) -> Self {
        let mut totals = TaxTotals::default();

        for line in lines {
            for tax in &line.transferred {
                match tax.tax_code.as_str() {
                    TAX_IVA => {
                        totals.transferred_vat += tax.amount;
                        totals.total_transferred += tax.amount;

                        match VatBucket::classify(&tax.factor_type, tax.rate) {
                            VatBucket::Exempt => {
                                // Exempt traslados carry no Importe, so
                                // vat_exempt normally stays zero
                                totals.base_exempt += tax.base;
                                totals.vat_exempt += tax.amount;
                            }
                            VatBucket::Sixteen => {
                                totals.base_16 += tax.base;
                                totals.vat_16 += tax.amount;
                            }
                            VatBucket::Eight => {
                                totals.base_8 += tax.base;
                                totals.vat_8 += tax.amount;
                            }
                            VatBucket::Zero => {
                                totals.base_0 += tax.base;
                                totals.vat_0 += tax.amount;
                            }
                            VatBucket::Unbucketed => {
                                totals.vat_unbucketed += tax.amount;
                            }
                        }
                    }
                    TAX_IEPS => {
                        totals.transferred_ieps += tax.amount;
                        totals.total_transferred += tax.amount;
                    }
                    _ => {}
                }
            }

            for tax in &line.withheld {
                match tax.tax_code.as_str() {
                    TAX_IVA => totals.withheld_vat += tax.amount,
                    TAX_ISR => totals.withheld_isr += tax.amount,
                    TAX_IEPS => totals.withheld_ieps += tax.amount,
                    _ => {}
                }
                totals.total_withheld += tax.amount;
            }
        }

        totals
    }

    /// Difference between the declared transferred total and the computed one,
    /// when it exceeds one cent.
    ///
    /// ```rust
    /// use cuentia_core::tax::TaxTotals;
    /// use rust_decimal::Decimal;
    ///
    /// let totals = TaxTotals::default();
    /// assert_eq!(totals.transferred_gap(Some(Decimal::new(5, 3))), None);
    /// assert_eq!(totals.transferred_gap(Some(Decimal::ONE)), Some(Decimal::ONE));
    /// assert_eq!(totals.transferred_gap(None), None);
    /// ```
    pub fn transferred_gap(&self, declared: Option<Decimal>) -> Option<Decimal> {
        let gap = declared? - self.total_transferred;
        (gap.abs() > RECONCILIATION_TOLERANCE).then_some(gap)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
