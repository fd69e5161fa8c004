//! Signed transactions per transfer job.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::DisburseResult;
use crate::store::models::TransferAttempt;

pub struct TransferAttemptRepository;

impl TransferAttemptRepository {
    /// Remember a signed transaction. Re-signing identical inputs yields the
    /// same hash, which is kept once.
    pub async fn insert(
        conn: &mut SqliteConnection,
        job_id: i64,
        tx_hash: &str,
        tx_nonce: i64,
        signed_tx: &str,
        worker_id: &str,
    ) -> DisburseResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfer_attempts (job_id, tx_hash, tx_nonce, signed_tx, worker_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (tx_hash) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(tx_hash)
        .bind(tx_nonce)
        .bind(signed_tx)
        .bind(worker_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Every transaction signed for `job_id` with `tx_nonce`, newest first.
    pub async fn list_for_nonce(
        conn: &mut SqliteConnection,
        job_id: i64,
        tx_nonce: i64,
    ) -> DisburseResult<Vec<TransferAttempt>> {
        let attempts = sqlx::query_as::<_, TransferAttempt>(
            r#"
            SELECT * FROM transfer_attempts
            WHERE job_id = ?1 AND tx_nonce = ?2
            ORDER BY id DESC
            "#,
        )
        .bind(job_id)
        .bind(tx_nonce)
        .fetch_all(&mut *conn)
        .await?;
        Ok(attempts)
    }
}
