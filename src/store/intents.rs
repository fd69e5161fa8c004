//! Disbursement intents.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::DisburseResult;
use crate::store::models::{Intent, IntentStatus, NewIntent};

pub struct IntentRepository;

impl IntentRepository {
    pub async fn insert(conn: &mut SqliteConnection, new: &NewIntent) -> DisburseResult<Intent> {
        let now = Utc::now();
        let intent = sqlx::query_as::<_, Intent>(
            r#"
            INSERT INTO intents
                (destination, token_id, amount, description, status, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING *
            "#,
        )
        .bind(&new.destination)
        .bind(new.token_id)
        .bind(&new.amount)
        .bind(&new.description)
        .bind(new.status)
        .bind(&new.created_by)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(intent)
    }

    pub async fn find(conn: &mut SqliteConnection, id: i64) -> DisburseResult<Option<Intent>> {
        let intent = sqlx::query_as::<_, Intent>("SELECT * FROM intents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(intent)
    }

    /// Flip a not-yet-approved intent to Approved.
    ///
    /// Returns false when the intent was already approved, so the caller
    /// enqueues at most one job.
    pub async fn mark_approved(
        conn: &mut SqliteConnection,
        id: i64,
        updated_by: &str,
    ) -> DisburseResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE intents
            SET status = ?1, updated_by = ?2, updated_at = ?3
            WHERE id = ?4 AND status <> ?1
            "#,
        )
        .bind(IntentStatus::Approved)
        .bind(updated_by)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn count(conn: &mut SqliteConnection) -> DisburseResult<i64> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM intents")
            .fetch_one(&mut *conn)
            .await?;
        Ok(total)
    }

    /// Newest first.
    pub async fn page(
        conn: &mut SqliteConnection,
        limit: i64,
        offset: i64,
    ) -> DisburseResult<Vec<Intent>> {
        let intents = sqlx::query_as::<_, Intent>(
            "SELECT * FROM intents ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;
        Ok(intents)
    }
}
