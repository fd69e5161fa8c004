//! Approver permission registry.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::config::schema::ApproverEntry;
use crate::error::DisburseResult;
use crate::store::models::{Approver, PermissionLevel};

pub struct ApproverRepository;

impl ApproverRepository {
    pub async fn upsert(
        conn: &mut SqliteConnection,
        entry: &ApproverEntry,
        address: &str,
    ) -> DisburseResult<Approver> {
        let approver = sqlx::query_as::<_, Approver>(
            r#"
            INSERT INTO approvers (name, address, permission_level, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (address) DO UPDATE
                SET name = excluded.name,
                    permission_level = excluded.permission_level
            RETURNING *
            "#,
        )
        .bind(&entry.name)
        .bind(address)
        .bind(entry.permission)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        Ok(approver)
    }

    /// Whether `address` holds full permission. Comparison ignores case.
    pub async fn has_full_permission(
        conn: &mut SqliteConnection,
        address: &str,
    ) -> DisburseResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM approvers WHERE LOWER(address) = LOWER(?1) AND permission_level = ?2",
        )
        .bind(address)
        .bind(PermissionLevel::Full)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count > 0)
    }
}
