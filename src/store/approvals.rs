//! Append-only approval votes.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::DisburseResult;
use crate::store::models::{Approval, Vote};

pub struct ApprovalRepository;

impl ApprovalRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        intent_id: i64,
        approver_id: &str,
        approver_address: &str,
        vote: Vote,
    ) -> DisburseResult<Approval> {
        let approval = sqlx::query_as::<_, Approval>(
            r#"
            INSERT INTO approvals (intent_id, approver_id, approver_address, vote, voted_at, created_by)
            VALUES (?1, ?2, ?3, ?4, ?5, ?2)
            RETURNING *
            "#,
        )
        .bind(intent_id)
        .bind(approver_id)
        .bind(approver_address)
        .bind(vote)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        Ok(approval)
    }

    /// Distinct addresses with an Approved vote; repeats by one address count once.
    pub async fn count_distinct_approved(
        conn: &mut SqliteConnection,
        intent_id: i64,
    ) -> DisburseResult<i64> {
        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT LOWER(approver_address))
            FROM approvals
            WHERE intent_id = ?1 AND vote = ?2
            "#,
        )
        .bind(intent_id)
        .bind(Vote::Approved)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    pub async fn list_for_intent(
        conn: &mut SqliteConnection,
        intent_id: i64,
    ) -> DisburseResult<Vec<Approval>> {
        let approvals = sqlx::query_as::<_, Approval>(
            "SELECT * FROM approvals WHERE intent_id = ?1 ORDER BY id",
        )
        .bind(intent_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(approvals)
    }
}
