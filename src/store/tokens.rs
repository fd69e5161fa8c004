//! Token registry.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::config::schema::TokenEntry;
use crate::error::DisburseResult;
use crate::store::models::Token;

pub struct TokenRepository;

impl TokenRepository {
    pub async fn find(conn: &mut SqliteConnection, id: i64) -> DisburseResult<Option<Token>> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(token)
    }

    /// Insert or refresh a registry entry keyed by contract address.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        entry: &TokenEntry,
        contract_address: &str,
    ) -> DisburseResult<Token> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (name, symbol, contract_address, decimals, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (contract_address) DO UPDATE
                SET name = excluded.name,
                    symbol = excluded.symbol,
                    decimals = excluded.decimals
            RETURNING *
            "#,
        )
        .bind(&entry.name)
        .bind(&entry.symbol)
        .bind(contract_address)
        .bind(i64::from(entry.decimals))
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await?;
        Ok(token)
    }

    pub async fn list(conn: &mut SqliteConnection) -> DisburseResult<Vec<Token>> {
        let tokens = sqlx::query_as::<_, Token>("SELECT * FROM tokens ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        Ok(tokens)
    }
}
