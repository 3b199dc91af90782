//! # Entry Processor
//!
//! Turns one claimed queue entry into committed rows, or into an error
//! annotation on the entry.
//!
//! ## Per-entry Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  QueueEntry                                                             │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  read file_path ──► Document::parse                                     │
//! │     │                                                                   │
//! │     ├── path has /cancelados/ ──► CancellationTarget::resolve           │
//! │     │                              store.apply_cancellation   (1 tx)    │
//! │     │                                                                   │
//! │     └── otherwise ──► DocumentPlan::build ──► log plan warnings         │
//! │                        store.persist_document                 (1 tx)    │
//! │                                                                         │
//! │  ClaimLost ──► skip: another worker owns the entry now                  │
//! │  any other error ──► (tx already rolled back)                           │
//! │                store.mark_processed(id, Some(annotation))     (1 tx)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The entry always ends `procesado = TRUE` unless the store is unreachable
//! even for the error mark; then the claim lease expires and another worker
//! picks the entry up again. Every store call carries this processor's
//! worker id, so a worker that lost its lease never writes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use cuentia_core::{
    CancellationTarget, Document, DocumentPlan, PlanWarning, QueueEntry, SourceKind,
};
use cuentia_db::{CfdiStore, PersistOutcome};

use crate::error::{EtlError, EtlResult};

/// What happened to one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Document rows committed.
    Persisted {
        uuid: String,
        outcome: PersistOutcome,
    },

    /// Cancellation applied. `updated` may be zero.
    Cancelled {
        uuid: String,
        table: &'static str,
        updated: u64,
    },

    /// Entry marked processed with an error annotation.
    Failed { annotation: String },

    /// The claim was taken over by another worker. Nothing was written.
    ClaimLost,
}

/// Processes claimed entries against a [`CfdiStore`].
#[derive(Clone)]
pub struct EntryProcessor {
    store: Arc<dyn CfdiStore>,
    worker_id: String,
}

impl EntryProcessor {
    /// `worker_id` must be the id the entries were claimed under.
    pub fn new(store: Arc<dyn CfdiStore>, worker_id: impl Into<String>) -> Self {
        EntryProcessor {
            store,
            worker_id: worker_id.into(),
        }
    }

    /// Processes one entry to its terminal state.
    ///
    /// ## Returns
    /// * `Ok(outcome)` - the entry is marked processed
    /// * `Err(EtlError)` - even the error mark failed; the entry stays
    ///   claimed until its lease expires
    pub async fn process(&self, entry: &QueueEntry) -> EtlResult<EntryOutcome> {
        let source = entry.source_kind();

        match self.handle(entry, source).await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_claim_lost() => {
                self.log_claim_lost(entry);
                Ok(EntryOutcome::ClaimLost)
            }
            Err(err) => {
                let annotation = err.annotation(source);

                warn!(
                    entry_id = entry.id,
                    file_path = %entry.file_path,
                    kind = err.kind(),
                    error = %err,
                    "Entry failed, marking processed with error"
                );

                let marked = self
                    .store
                    .mark_processed(&self.worker_id, entry.id, Some(&annotation))
                    .await;

                if let Err(mark_err) = marked {
                    if mark_err.is_claim_lost() {
                        self.log_claim_lost(entry);
                        return Ok(EntryOutcome::ClaimLost);
                    }
                    error!(
                        entry_id = entry.id,
                        ?mark_err,
                        "Failed to mark entry with error, leaving it for lease expiry"
                    );
                    return Err(mark_err.into());
                }

                Ok(EntryOutcome::Failed { annotation })
            }
        }
    }

    fn log_claim_lost(&self, entry: &QueueEntry) {
        warn!(
            entry_id = entry.id,
            worker_id = %self.worker_id,
            "Claim taken over by another worker, skipping entry"
        );
    }

    async fn handle(&self, entry: &QueueEntry, source: SourceKind) -> EtlResult<EntryOutcome> {
        debug!(entry_id = entry.id, file_path = %entry.file_path, "Processing entry");

        let raw = read_document(&entry.file_path).await?;
        let document = Document::parse(&raw)?;

        match source {
            SourceKind::Cancelled => self.cancel(entry, &document).await,
            SourceKind::Active => self.persist(entry, document).await,
        }
    }

    async fn cancel(&self, entry: &QueueEntry, document: &Document) -> EtlResult<EntryOutcome> {
        let target = CancellationTarget::resolve(entry, document)?;
        let updated = self
            .store
            .apply_cancellation(&self.worker_id, entry.id, &target)
            .await?;

        if updated == 0 {
            info!(
                entry_id = entry.id,
                uuid = %target.uuid(),
                table = target.table(),
                "Cancellation matched no rows"
            );
        } else {
            info!(
                entry_id = entry.id,
                uuid = %target.uuid(),
                table = target.table(),
                updated,
                "CFDI cancelled"
            );
        }

        Ok(EntryOutcome::Cancelled {
            uuid: target.uuid().to_string(),
            table: target.table(),
            updated,
        })
    }

    async fn persist(&self, entry: &QueueEntry, document: Document) -> EtlResult<EntryOutcome> {
        let plan = DocumentPlan::build(entry, document, Utc::now().naive_utc())?;
        log_warnings(entry, &plan);

        let outcome = self
            .store
            .persist_document(&self.worker_id, entry.id, &plan)
            .await?;

        if !outcome.header_inserted {
            debug!(entry_id = entry.id, uuid = %plan.uuid(), "Header already stored");
        }

        info!(
            entry_id = entry.id,
            uuid = %plan.uuid(),
            voucher_type = %plan.voucher_type,
            movement = %plan.header.movement,
            lines = outcome.lines,
            payments = outcome.payments,
            "CFDI processed"
        );

        Ok(EntryOutcome::Persisted {
            uuid: plan.uuid().to_string(),
            outcome,
        })
    }
}

/// Reads the queued file. Invalid UTF-8 is replaced rather than rejected.
async fn read_document(path: &str) -> EtlResult<String> {
    let bytes = tokio::fs::read(path).await.map_err(|source| EtlError::FileRead {
        path: path.to_string(),
        source,
    })?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn log_warnings(entry: &QueueEntry, plan: &DocumentPlan) {
    for warning in &plan.warnings {
        match warning {
            PlanWarning::NeedsReview(movement) => warn!(
                entry_id = entry.id,
                uuid = %plan.uuid(),
                movement = %movement,
                "Movement could not be determined, flagged for review"
            ),
            PlanWarning::MissingPaymentsNode => warn!(
                entry_id = entry.id,
                uuid = %plan.uuid(),
                "Payment complement without Pagos node, no payment rows written"
            ),
            PlanWarning::TransferredTaxMismatch { declared, computed } => warn!(
                entry_id = entry.id,
                uuid = %plan.uuid(),
                %declared,
                %computed,
                "Declared transferred taxes differ from computed total"
            ),
        }
    }
}
