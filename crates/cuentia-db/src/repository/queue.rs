//! # Queue Repository
//!
//! Claims and completes `cfdi_files` rows.
//!
//! ## Claim Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Worker A                         Worker B                              │
//! │     │                                │                                  │
//! │  BEGIN                            BEGIN                                 │
//! │  UPDATE .. WHERE id IN (          UPDATE .. WHERE id IN (               │
//! │    SELECT .. FOR UPDATE             SELECT .. FOR UPDATE                │
//! │    SKIP LOCKED LIMIT 200)           SKIP LOCKED LIMIT 200)              │
//! │  SET claimed_at, claimed_by          └── skips A's locked rows          │
//! │  COMMIT  ◄── lock released                                              │
//! │     │                             next cycle: A's rows now carry a      │
//! │     │                             fresh claimed_at, so the lease        │
//! │     │                             filter excludes them                  │
//! │  parse + persist each entry                                             │
//! │  mark_processed (procesado = TRUE, claim cleared)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The row lock only protects selection. The lease stamped in the same
//! statement is what keeps a committed claim exclusive until the entry is
//! processed or the lease expires (crashed or stalled worker).
//!
//! An expired lease can be taken over while the original worker is still
//! busy with the entry. Every write that completes an entry therefore goes
//! through [`mark_processed`], which only matches a row that is still
//! unprocessed and still claimed by the calling worker. A miss is
//! [`DbError::ClaimLost`] and rolls the whole document transaction back.

use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use tracing::debug;

use crate::error::{DbError, DbResult};
use cuentia_core::QueueEntry;

const CLAIM_BATCH_SQL: &str = r#"
    UPDATE cfdi_files
    SET claimed_at = NOW(), claimed_by = $2
    WHERE id IN (
        SELECT id
        FROM cfdi_files
        WHERE procesado = FALSE
          AND (claimed_at IS NULL OR claimed_at < NOW() - make_interval(secs => $3))
        ORDER BY id
        FOR UPDATE SKIP LOCKED
        LIMIT $1
    )
    RETURNING id, rfc, uuid, fecha_emision, origen, file_path
"#;

/// Fields an ingester provides when registering a file.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub rfc: String,
    pub uuid: Option<String>,
    pub fecha_emision: Option<chrono::NaiveDate>,
    pub origen: String,
    pub file_path: String,
    pub tipo: Option<String>,
}

/// Repository for `cfdi_files` operations that run outside a document
/// transaction.
#[derive(Debug, Clone)]
pub struct QueueRepository {
    pool: PgPool,
}

impl QueueRepository {
    /// Creates a new QueueRepository.
    pub fn new(pool: PgPool) -> Self {
        QueueRepository { pool }
    }

    /// Claims up to `limit` unprocessed entries for `worker_id`.
    ///
    /// Runs in its own short transaction and commits before returning.
    /// Entries come back in ascending id order.
    pub async fn claim_batch(
        &self,
        worker_id: &str,
        limit: i64,
        lease: Duration,
    ) -> DbResult<Vec<QueueEntry>> {
        let mut tx = self.pool.begin().await?;

        let mut entries = sqlx::query_as::<_, QueueEntry>(CLAIM_BATCH_SQL)
            .bind(limit)
            .bind(worker_id)
            .bind(lease.as_secs_f64())
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        // RETURNING order is unspecified
        entries.sort_by_key(|entry| entry.id);

        debug!(worker_id = %worker_id, count = entries.len(), "Claimed queue entries");
        Ok(entries)
    }

    /// Drops this worker's claim on entries it will not process.
    pub async fn release_claims(&self, worker_id: &str, ids: &[i64]) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE cfdi_files
            SET claimed_at = NULL, claimed_by = NULL
            WHERE id = ANY($1) AND claimed_by = $2 AND procesado = FALSE
            "#,
        )
        .bind(ids)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Marks an entry processed in its own transaction (the error path).
    pub async fn mark_processed(
        &self,
        worker_id: &str,
        id: i64,
        error: Option<&str>,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        mark_processed(&mut *tx, worker_id, id, error).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Registers a file, the way the ingesters do.
    pub async fn enqueue(&self, entry: &NewQueueEntry) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cfdi_files (rfc, uuid, fecha_emision, origen, file_path, tipo, procesado)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            RETURNING id
            "#,
        )
        .bind(&entry.rfc)
        .bind(&entry.uuid)
        .bind(entry.fecha_emision)
        .bind(&entry.origen)
        .bind(&entry.file_path)
        .bind(&entry.tipo)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Number of entries not yet processed.
    pub async fn pending_count(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cfdi_files WHERE procesado = FALSE")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

/// Flips `procesado`, stores the error annotation and clears the claim.
///
/// Takes a connection so it can open a document transaction: the row lock
/// it takes keeps the claim from being taken over until commit.
///
/// ## Returns
/// * `Ok(())` - the entry was still claimed by `worker_id` and is now done
/// * `Err(DbError::ClaimLost)` - unprocessed-and-ours matched no row
pub async fn mark_processed(
    conn: &mut PgConnection,
    worker_id: &str,
    id: i64,
    error: Option<&str>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE cfdi_files
        SET procesado = TRUE,
            error_message = $2,
            processed_at = NOW(),
            claimed_at = NULL,
            claimed_by = NULL
        WHERE id = $1 AND procesado = FALSE AND claimed_by = $3
        "#,
    )
    .bind(id)
    .bind(error)
    .bind(worker_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::claim_lost(id, worker_id));
    }

    Ok(())
}
