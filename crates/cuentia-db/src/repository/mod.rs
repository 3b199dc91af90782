//! # Repository Module
//!
//! SQL for the queue table and the four CFDI output tables.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QueueRepository (pool-scoped)         CfdiWriter (connection-scoped)  │
//! │  ├── claim_batch(worker, n, lease)     ├── insert_header               │
//! │  ├── release_claims(worker, ids)       ├── insert_line                 │
//! │  ├── mark_processed(id, error)         ├── insert_credit_note          │
//! │  ├── enqueue(entry)                    ├── insert_payment              │
//! │  └── pending_count()                   └── cancel(target)              │
//! │                                                                         │
//! │  queue::mark_processed(conn, ..) is shared by both sides so a          │
//! │  document transaction can close the entry itself.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`QueueRepository`](queue::QueueRepository) - `cfdi_files` claims
//! - [`CfdiWriter`](cfdi::CfdiWriter) - `cfdis`, `conceptos_cfdis`,
//!   `notas_credito_cfdi`, `pagos_cfdi`

pub mod cfdi;
pub mod queue;
