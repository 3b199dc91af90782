//! # CFDI Store
//!
//! The persistence seam the worker runs against.
//!
//! ## Transaction Boundaries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  claim_batch         BEGIN → UPDATE .. SKIP LOCKED → COMMIT            │
//! │                                                                         │
//! │  persist_document    BEGIN                                              │
//! │                        UPDATE cfdi_files       (still ours? else        │
//! │                          SET procesado = TRUE   ClaimLost → ROLLBACK)   │
//! │                        INSERT cfdis            (ON CONFLICT DO NOTHING) │
//! │                        INSERT conceptos_cfdis  × lines                  │
//! │                        INSERT notas_credito    (ON CONFLICT DO NOTHING) │
//! │                        INSERT pagos_cfdi       × payment rows           │
//! │                      COMMIT                    (any error → ROLLBACK)   │
//! │                                                                         │
//! │  apply_cancellation  BEGIN → UPDATE cfdi_files → UPDATE target → COMMIT│
//! │                                                                         │
//! │  mark_processed      BEGIN → UPDATE cfdi_files → COMMIT (error path)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A document either lands completely, together with its queue flag, or not
//! at all. Every completing call names the worker that claimed the entry; a
//! worker whose lease was taken over gets
//! [`DbError::ClaimLost`](crate::error::DbError::ClaimLost) and writes
//! nothing.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::cfdi::CfdiWriter;
use crate::repository::queue;
use cuentia_core::{CancellationTarget, DocumentPlan, QueueEntry};

/// Row counts written for one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// `false` when the header UUID was already stored.
    pub header_inserted: bool,
    pub lines: usize,
    pub credit_note_inserted: bool,
    pub payments: usize,
}

/// Storage operations used by the ETL worker.
#[async_trait]
pub trait CfdiStore: Send + Sync {
    /// Claims up to `limit` pending entries for `worker_id`.
    async fn claim_batch(
        &self,
        worker_id: &str,
        limit: i64,
        lease: Duration,
    ) -> DbResult<Vec<QueueEntry>>;

    /// Writes every row of `plan` and marks the entry processed, atomically.
    async fn persist_document(
        &self,
        worker_id: &str,
        entry_id: i64,
        plan: &DocumentPlan,
    ) -> DbResult<PersistOutcome>;

    /// Flips the target's status to cancelled and marks the entry processed,
    /// atomically. Returns the number of rows the status update touched.
    async fn apply_cancellation(
        &self,
        worker_id: &str,
        entry_id: i64,
        target: &CancellationTarget,
    ) -> DbResult<u64>;

    /// Marks the entry processed with an optional error annotation.
    async fn mark_processed(
        &self,
        worker_id: &str,
        entry_id: i64,
        error: Option<&str>,
    ) -> DbResult<()>;

    /// Returns claimed entries to the pool without processing them.
    async fn release_claims(&self, worker_id: &str, ids: &[i64]) -> DbResult<u64>;
}

#[async_trait]
impl CfdiStore for Database {
    async fn claim_batch(
        &self,
        worker_id: &str,
        limit: i64,
        lease: Duration,
    ) -> DbResult<Vec<QueueEntry>> {
        self.queue().claim_batch(worker_id, limit, lease).await
    }

    async fn persist_document(
        &self,
        worker_id: &str,
        entry_id: i64,
        plan: &DocumentPlan,
    ) -> DbResult<PersistOutcome> {
        let mut tx = self.begin().await?;

        queue::mark_processed(&mut *tx, worker_id, entry_id, None).await?;

        let outcome = {
            let mut writer = CfdiWriter::new(&mut *tx);

            let header_inserted = writer.insert_header(&plan.header).await?;

            for line in &plan.lines {
                writer.insert_line(line).await?;
            }

            let credit_note_inserted = match &plan.credit_note {
                Some(note) => writer.insert_credit_note(note).await?,
                None => false,
            };

            for payment in &plan.payments {
                writer.insert_payment(payment).await?;
            }

            PersistOutcome {
                header_inserted,
                lines: plan.lines.len(),
                credit_note_inserted,
                payments: plan.payments.len(),
            }
        };

        tx.commit().await?;

        debug!(
            entry_id,
            uuid = %plan.uuid(),
            header_inserted = outcome.header_inserted,
            lines = outcome.lines,
            payments = outcome.payments,
            "Document committed"
        );

        Ok(outcome)
    }

    async fn apply_cancellation(
        &self,
        worker_id: &str,
        entry_id: i64,
        target: &CancellationTarget,
    ) -> DbResult<u64> {
        let mut tx = self.begin().await?;

        queue::mark_processed(&mut *tx, worker_id, entry_id, None).await?;
        let updated = CfdiWriter::new(&mut *tx).cancel(target).await?;

        tx.commit().await?;

        debug!(
            entry_id,
            uuid = %target.uuid(),
            table = target.table(),
            updated,
            "Cancellation committed"
        );

        Ok(updated)
    }

    async fn mark_processed(
        &self,
        worker_id: &str,
        entry_id: i64,
        error: Option<&str>,
    ) -> DbResult<()> {
        self.queue().mark_processed(worker_id, entry_id, error).await
    }

    async fn release_claims(&self, worker_id: &str, ids: &[i64]) -> DbResult<u64> {
        self.queue().release_claims(worker_id, ids).await
    }
}
