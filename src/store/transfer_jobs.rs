//! Transfer outbox rows.
//!
//! Every mutation issued by the outbox is guarded by `status = 'pending'`, and
//! the ones made while holding a claim are also guarded by `claimed_by`, so a
//! worker whose lease expired cannot overwrite a newer owner's progress.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::DisburseResult;
use crate::store::models::{InFlight, NewTransferJob, TransferJob, TransferStatus};

pub struct TransferJobRepository;

/// Parameters of one claim round.
#[derive(Debug, Clone, Copy)]
pub struct ClaimRequest<'a> {
    pub worker_id: &'a str,
    pub now_ms: i64,
    /// Claims taken at or before this instant are abandoned.
    pub stale_before_ms: i64,
    pub retry_cap: i64,
    pub limit: i64,
}

impl TransferJobRepository {
    /// Enqueue a job; `None` if the intent already has one.
    pub async fn insert(
        conn: &mut SqliteConnection,
        new: &NewTransferJob,
    ) -> DisburseResult<Option<TransferJob>> {
        let now = Utc::now();
        let job = sqlx::query_as::<_, TransferJob>(
            r#"
            INSERT INTO transfer_jobs
                (intent_id, token_id, to_address, contract_address, amount,
                 status, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT (intent_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new.intent_id)
        .bind(new.token_id)
        .bind(&new.to_address)
        .bind(&new.contract_address)
        .bind(&new.amount)
        .bind(TransferStatus::Pending)
        .bind(&new.created_by)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(job)
    }

    pub async fn find(conn: &mut SqliteConnection, id: i64) -> DisburseResult<Option<TransferJob>> {
        let job = sqlx::query_as::<_, TransferJob>("SELECT * FROM transfer_jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(job)
    }

    pub async fn find_by_intent(
        conn: &mut SqliteConnection,
        intent_id: i64,
    ) -> DisburseResult<Option<TransferJob>> {
        let job =
            sqlx::query_as::<_, TransferJob>("SELECT * FROM transfer_jobs WHERE intent_id = ?1")
                .bind(intent_id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(job)
    }

    /// Atomically lease up to `limit` eligible jobs to one worker.
    ///
    /// Eligible: Pending, under the retry cap, and either unclaimed with no
    /// transaction in flight or holding a claim that went stale.
    pub async fn claim_batch(
        conn: &mut SqliteConnection,
        request: ClaimRequest<'_>,
    ) -> DisburseResult<Vec<TransferJob>> {
        let mut jobs = sqlx::query_as::<_, TransferJob>(
            r#"
            UPDATE transfer_jobs
            SET claimed_by = ?1, claimed_at_ms = ?2
            WHERE id IN (
                SELECT id FROM transfer_jobs
                WHERE status = ?3
                  AND retry_count < ?4
                  AND (
                        (tx_hash = '' AND claimed_by IS NULL)
                     OR (claimed_by IS NOT NULL AND claimed_at_ms <= ?5)
                  )
                ORDER BY id
                LIMIT ?6
            )
            RETURNING *
            "#,
        )
        .bind(request.worker_id)
        .bind(request.now_ms)
        .bind(TransferStatus::Pending)
        .bind(request.retry_cap)
        .bind(request.stale_before_ms)
        .bind(request.limit)
        .fetch_all(&mut *conn)
        .await?;

        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    /// Push the lease of a held claim forward to `now_ms`.
    ///
    /// Returns false once the claim belongs to someone else or the job left
    /// Pending.
    pub async fn renew_claim(
        conn: &mut SqliteConnection,
        id: i64,
        worker_id: &str,
        now_ms: i64,
    ) -> DisburseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET claimed_at_ms = ?1
            WHERE id = ?2 AND claimed_by = ?3 AND status = ?4
            "#,
        )
        .bind(now_ms)
        .bind(id)
        .bind(worker_id)
        .bind(TransferStatus::Pending)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Write-ahead record of a signed transaction before it is broadcast.
    /// Also renews the lease.
    ///
    /// Returns false if the claim was lost.
    pub async fn record_submission(
        conn: &mut SqliteConnection,
        id: i64,
        worker_id: &str,
        from_address: &str,
        in_flight: &InFlight,
        transfer_data: &str,
    ) -> DisburseResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET tx_hash = ?1, signed_tx = ?2, tx_nonce = ?3, transfer_data = ?4,
                from_address = ?5, updated_by = ?6, updated_at = ?7, claimed_at_ms = ?8
            WHERE id = ?9 AND claimed_by = ?6 AND status = ?10
            "#,
        )
        .bind(&in_flight.tx_hash)
        .bind(&in_flight.signed_tx)
        .bind(in_flight.tx_nonce)
        .bind(transfer_data)
        .bind(from_address)
        .bind(worker_id)
        .bind(now)
        .bind(now.timestamp_millis())
        .bind(id)
        .bind(TransferStatus::Pending)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Overwrite the in-flight transaction; an empty `InFlight` clears it.
    pub async fn set_in_flight(
        conn: &mut SqliteConnection,
        id: i64,
        worker_id: &str,
        in_flight: &InFlight,
    ) -> DisburseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET tx_hash = ?1, signed_tx = ?2, tx_nonce = ?3, updated_by = ?4, updated_at = ?5
            WHERE id = ?6 AND claimed_by = ?4 AND status = ?7
            "#,
        )
        .bind(&in_flight.tx_hash)
        .bind(&in_flight.signed_tx)
        .bind(in_flight.tx_nonce)
        .bind(worker_id)
        .bind(Utc::now())
        .bind(id)
        .bind(TransferStatus::Pending)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Settle a job from the outbox side. The claim is released.
    pub async fn mark_success(
        conn: &mut SqliteConnection,
        id: i64,
        tx_hash: &str,
        updated_by: &str,
    ) -> DisburseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET status = ?1, tx_hash = ?2, last_error = NULL,
                claimed_by = NULL, claimed_at_ms = NULL, updated_by = ?3, updated_at = ?4
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(TransferStatus::Success)
        .bind(tx_hash)
        .bind(updated_by)
        .bind(Utc::now())
        .bind(id)
        .bind(TransferStatus::Pending)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Terminal failure: the job's inputs cannot produce a valid transaction.
    pub async fn mark_failed(
        conn: &mut SqliteConnection,
        id: i64,
        error: &str,
        updated_by: &str,
    ) -> DisburseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET status = ?1, last_error = ?2,
                claimed_by = NULL, claimed_at_ms = NULL, updated_by = ?3, updated_at = ?4
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(TransferStatus::Failed)
        .bind(error)
        .bind(updated_by)
        .bind(Utc::now())
        .bind(id)
        .bind(TransferStatus::Pending)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Count one exhausted tick against the job, never past `retry_cap`.
    ///
    /// With `keep_in_flight` the hash and the claim stay so a later resume or
    /// the scanner can settle the outstanding transaction; otherwise both are
    /// cleared and the job is free for the next tick.
    pub async fn record_exhausted(
        conn: &mut SqliteConnection,
        id: i64,
        worker_id: &str,
        retry_cap: i64,
        error: &str,
        keep_in_flight: bool,
    ) -> DisburseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET retry_count   = MIN(retry_count + 1, ?1),
                last_error    = ?2,
                tx_hash       = CASE WHEN ?3 THEN tx_hash ELSE '' END,
                signed_tx     = CASE WHEN ?3 THEN signed_tx ELSE '' END,
                tx_nonce      = CASE WHEN ?3 THEN tx_nonce ELSE NULL END,
                claimed_by    = CASE WHEN ?3 THEN claimed_by ELSE NULL END,
                claimed_at_ms = CASE WHEN ?3 THEN claimed_at_ms ELSE NULL END,
                updated_by    = ?4,
                updated_at    = ?5
            WHERE id = ?6 AND claimed_by = ?4 AND status = ?7
            "#,
        )
        .bind(retry_cap)
        .bind(error)
        .bind(keep_in_flight)
        .bind(worker_id)
        .bind(Utc::now())
        .bind(id)
        .bind(TransferStatus::Pending)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Drop a claim without counting an attempt, but only when nothing is in
    /// flight; a job with a recorded hash keeps its claim until the lease expires.
    pub async fn release_idle_claim(
        conn: &mut SqliteConnection,
        id: i64,
        worker_id: &str,
    ) -> DisburseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET claimed_by = NULL, claimed_at_ms = NULL
            WHERE id = ?1 AND claimed_by = ?2 AND tx_hash = ''
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Settle the Pending job that signed an observed transaction, matched
    /// by sender and by its current hash or any earlier attempt's hash. The
    /// job takes the observed hash. Returns the number of jobs settled.
    pub async fn settle_observed(
        conn: &mut SqliteConnection,
        tx_hash: &str,
        from_address: &str,
        updated_by: &str,
    ) -> DisburseResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE transfer_jobs
            SET status = ?1, tx_hash = ?4, claimed_by = NULL, claimed_at_ms = NULL,
                updated_by = ?2, updated_at = ?3
            WHERE LOWER(from_address) = LOWER(?5) AND status = ?6
              AND (
                    tx_hash = ?4
                 OR id IN (SELECT job_id FROM transfer_attempts WHERE tx_hash = ?4)
              )
            "#,
        )
        .bind(TransferStatus::Success)
        .bind(updated_by)
        .bind(Utc::now())
        .bind(tx_hash)
        .bind(from_address)
        .bind(TransferStatus::Pending)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn count(
        conn: &mut SqliteConnection,
        status: Option<TransferStatus>,
    ) -> DisburseResult<i64> {
        let total = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transfer_jobs WHERE ?1 IS NULL OR status = ?1",
        )
        .bind(status)
        .fetch_one(&mut *conn)
        .await?;
        Ok(total)
    }

    /// Newest first, optionally filtered by status.
    pub async fn page(
        conn: &mut SqliteConnection,
        status: Option<TransferStatus>,
        limit: i64,
        offset: i64,
    ) -> DisburseResult<Vec<TransferJob>> {
        let jobs = sqlx::query_as::<_, TransferJob>(
            r#"
            SELECT * FROM transfer_jobs
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
        Ok(jobs)
    }
}
