//! # Movement Classifier
//!
//! Decides whether a document is income or expense *for the owner RFC*, the
//! taxpayer whose download produced the queue entry.
//!
//! ## Decision Table
//! ```text
//! ┌──────────────┬──────────────────────────────────────┬────────────────────┐
//! │ Voucher type │ Condition (RFCs compared upper-case) │ Movement           │
//! ├──────────────┼──────────────────────────────────────┼────────────────────┤
//! │ P            │ always                               │ PaymentComplement  │
//! │ N            │ owner == issuer (employer)           │ Expense            │
//! │ N            │ owner == recipient (employee)        │ Income             │
//! │ N            │ otherwise                            │ UnknownPayroll     │
//! │ I / E / T    │ owner == issuer, owner != recipient  │ Income             │
//! │ I / E / T    │ owner == recipient, owner != issuer  │ Expense            │
//! │ I / E / T    │ otherwise (self-issued, unrelated)   │ Unknown            │
//! └──────────────┴──────────────────────────────────────┴────────────────────┘
//! ```
//!
//! `Unknown` and `UnknownPayroll` are persisted anyway; the worker logs a
//! review warning for them.

use crate::types::{Movement, VoucherType};

/// Classifies a document relative to the owner.
pub fn classify(
    voucher_type: VoucherType,
    issuer_rfc: &str,
    recipient_rfc: &str,
    owner_rfc: &str,
) -> Movement {
    let issuer = normalize(issuer_rfc);
    let recipient = normalize(recipient_rfc);
    let owner = normalize(owner_rfc);

    match voucher_type {
        VoucherType::PaymentComplement => Movement::PaymentComplement,
        VoucherType::Payroll => {
            if owner == issuer {
                Movement::Expense
            } else if owner == recipient {
                Movement::Income
            } else {
                Movement::UnknownPayroll
            }
        }
        _ => {
            let issued_by_owner = owner == issuer;
            let received_by_owner = owner == recipient;

            match (issued_by_owner, received_by_owner) {
                (true, false) => Movement::Income,
                (false, true) => Movement::Expense,
                _ => Movement::Unknown,
            }
        }
    }
}

fn normalize(rfc: &str) -> String {
    rfc.trim().to_uppercase()
}
