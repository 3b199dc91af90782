//! # cuentia-core: Pure CFDI Transformation Logic
//!
//! Everything that turns a raw CFDI XML file into the rows CuentIA persists,
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CuentIA ETL Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        Ingesters (scraper, SAT bulk-download web service)       │   │
//! │  │        write XML files + cfdi_files queue rows                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 etl-worker (claim → process → mark)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ cuentia-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   xml ─► document ─► classify ─► sign ─► tax ─► plan            │   │
//! │  │                                              └─► expansion      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 cuentia-db (PostgreSQL layer)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`xml`] - Namespace-free element tree over `quick-xml`
//! - [`document`] - CFDI 3.3 / 4.0 normalizer
//! - [`classify`] - Income / expense relative to the owner RFC
//! - [`sign`] - Credit-note negation
//! - [`tax`] - Per-document tax aggregation
//! - [`expansion`] - Credit-note and payment rows
//! - [`plan`] - Everything one queue entry writes
//! - [`money`] - Lenient decimal coercion, VAT buckets
//! - [`error`] - Document error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use cuentia_core::{classify, Movement, VoucherType};
//!
//! let movement = classify(VoucherType::Income, "AAA010101AAA", "BBB010101BBB", "aaa010101aaa");
//! assert_eq!(movement, Movement::Income);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod classify;
pub mod document;
pub mod error;
pub mod expansion;
pub mod money;
pub mod plan;
pub mod records;
pub mod sign;
pub mod tax;
pub mod types;
pub mod xml;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use classify::classify;
pub use document::Document;
pub use error::{CoreError, CoreResult};
pub use plan::{CancellationTarget, DocumentPlan, PlanWarning};
pub use records::*;
pub use tax::TaxTotals;
pub use types::*;
