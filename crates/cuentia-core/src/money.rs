//! # Money Module
//!
//! Lenient numeric coercion and VAT rate bucketing for CFDI amounts.
//!
//! ## Why Decimal?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Summing line taxes as f64:                                             │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Financial reports built on top of `cfdis` must match the SAT to the   │
//! │  cent, so every attribute is read straight into a `Decimal`:           │
//! │    "0.10" + "0.20" = 0.30 exactly                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Coercion Rule
//! CFDI attributes are strings. Absent, blank or non-numeric values coerce to
//! zero instead of failing the document.
//!
//! ```rust
//! use cuentia_core::money::parse_amount;
//! use rust_decimal::Decimal;
//!
//! assert_eq!(parse_amount(Some("1160.00")), Decimal::new(116000, 2));
//! assert_eq!(parse_amount(Some("")), Decimal::ZERO);
//! assert_eq!(parse_amount(None), Decimal::ZERO);
//! ```

use rust_decimal::Decimal;
use std::str::FromStr;

// =============================================================================
// Coercion
// =============================================================================

/// Parses a CFDI numeric attribute, coercing absent/blank/garbage to zero.
pub fn parse_amount(raw: Option<&str>) -> Decimal {
    raw.and_then(parse_decimal).unwrap_or(Decimal::ZERO)
}

/// Like [`parse_amount`] but keeps absence visible.
///
/// An absent attribute stays `None`; a present one is coerced (garbage → 0).
pub fn parse_optional_amount(raw: Option<&str>) -> Option<Decimal> {
    raw.map(|value| parse_decimal(value).unwrap_or(Decimal::ZERO))
}

/// Parses an integer attribute such as `NumParcialidad`.
pub fn parse_count(raw: Option<&str>) -> Option<i32> {
    raw.and_then(|value| value.trim().parse::<i32>().ok())
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    Decimal::from_str(unsigned)
        .or_else(|_| Decimal::from_scientific(unsigned))
        .ok()
}

// =============================================================================
// VAT Rate Buckets
// =============================================================================

/// Half-width of the window around the 8% and 16% canonical rates.
const RATE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

const RATE_SIXTEEN: Decimal = Decimal::from_parts(16, 0, 0, false, 2);
const RATE_EIGHT: Decimal = Decimal::from_parts(8, 0, 0, false, 2);

/// The VAT bucket a transferred-tax sub-record contributes to.
///
/// ## Bucketing Rules (evaluated in order)
/// ```text
/// TipoFactor == "Exento"           → Exempt
/// 0.1599 <= TasaOCuota <= 0.1601   → Sixteen
/// 0.0799 <= TasaOCuota <= 0.0801   → Eight
/// TasaOCuota == 0                  → Zero
/// anything else                    → Unbucketed (counted in totals only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VatBucket {
    Zero,
    Eight,
    Sixteen,
    Exempt,
    /// A rate that matches none of the canonical buckets (e.g. border 10.67%).
    Unbucketed,
}

impl VatBucket {
    /// Classifies a VAT sub-record by factor type and rate.
    pub fn classify(factor_type: &str, rate: Decimal) -> Self {
        if factor_type.trim().eq_ignore_ascii_case("exento") {
            return VatBucket::Exempt;
        }

        if within(rate, RATE_SIXTEEN) {
            VatBucket::Sixteen
        } else if within(rate, RATE_EIGHT) {
            VatBucket::Eight
        } else if rate.is_zero() {
            VatBucket::Zero
        } else {
            VatBucket::Unbucketed
        }
    }
}

fn within(rate: Decimal, canonical: Decimal) -> bool {
    rate >= canonical - RATE_TOLERANCE && rate <= canonical + RATE_TOLERANCE
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount_plain() {
        assert_eq!(parse_amount(Some("1000.50")), dec!(1000.50));
        assert_eq!(parse_amount(Some("  42 ")), dec!(42));
        assert_eq!(parse_amount(Some("-15.5")), dec!(-15.5));
        assert_eq!(parse_amount(Some("+7")), dec!(7));
    }

    #[test]
    fn test_parse_amount_coerces_garbage_to_zero() {
        assert_eq!(parse_amount(None), Decimal::ZERO);
        assert_eq!(parse_amount(Some("")), Decimal::ZERO);
        assert_eq!(parse_amount(Some("   ")), Decimal::ZERO);
        assert_eq!(parse_amount(Some("N/A")), Decimal::ZERO);
    }

    #[test]
    fn test_parse_amount_scientific() {
        assert_eq!(parse_amount(Some("1e3")), dec!(1000));
    }

    #[test]
    fn test_parse_optional_amount() {
        assert_eq!(parse_optional_amount(None), None);
        assert_eq!(parse_optional_amount(Some("abc")), Some(Decimal::ZERO));
        assert_eq!(parse_optional_amount(Some("12.30")), Some(dec!(12.30)));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(Some("3")), Some(3));
        assert_eq!(parse_count(Some("x")), None);
        assert_eq!(parse_count(None), None);
    }

    #[test]
    fn test_vat_bucket_canonical_rates() {
        assert_eq!(VatBucket::classify("Tasa", dec!(0.160000)), VatBucket::Sixteen);
        assert_eq!(VatBucket::classify("Tasa", dec!(0.1601)), VatBucket::Sixteen);
        assert_eq!(VatBucket::classify("Tasa", dec!(0.080000)), VatBucket::Eight);
        assert_eq!(VatBucket::classify("Tasa", dec!(0.000000)), VatBucket::Zero);
    }

    #[test]
    fn test_vat_bucket_exempt_wins_over_rate() {
        assert_eq!(VatBucket::classify("Exento", Decimal::ZERO), VatBucket::Exempt);
        assert_eq!(VatBucket::classify("EXENTO", dec!(0.16)), VatBucket::Exempt);
    }

    #[test]
    fn test_vat_bucket_out_of_window() {
        assert_eq!(VatBucket::classify("Tasa", dec!(0.1602)), VatBucket::Unbucketed);
        assert_eq!(VatBucket::classify("Tasa", dec!(0.106667)), VatBucket::Unbucketed);
        assert_eq!(VatBucket::classify("Tasa", dec!(0.0001)), VatBucket::Unbucketed);
    }
}
