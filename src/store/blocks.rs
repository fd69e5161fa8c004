//! Observed blocks and transactions.
//!
//! Both tables are append-only. A row that already exists is reported as
//! `ReconciliationConflict` so the scanner can treat a re-scan as a no-op.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::error::{DisburseError, DisburseResult};
use crate::store::models::{BlockRecord, NewObservedTransaction, ObservedTransaction};

pub struct BlockRepository;

impl BlockRepository {
    /// High-water mark of the scan, `None` on an empty store.
    pub async fn latest_number(conn: &mut SqliteConnection) -> DisburseResult<Option<u64>> {
        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(block_number) FROM blocks")
            .fetch_one(&mut *conn)
            .await?;
        Ok(latest.and_then(|n| u64::try_from(n).ok()))
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        number: i64,
        hash: &str,
        parent_hash: &str,
        timestamp: i64,
    ) -> DisburseResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO blocks (block_number, block_hash, parent_hash, timestamp, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(number)
        .bind(hash)
        .bind(parent_hash)
        .bind(timestamp)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DisburseError::ReconciliationConflict(format!(
                "block {number} already recorded"
            )));
        }
        Ok(())
    }

    pub async fn find(
        conn: &mut SqliteConnection,
        number: i64,
    ) -> DisburseResult<Option<BlockRecord>> {
        let block = sqlx::query_as::<_, BlockRecord>("SELECT * FROM blocks WHERE block_number = ?1")
            .bind(number)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(block)
    }

    pub async fn count(conn: &mut SqliteConnection) -> DisburseResult<i64> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM blocks")
            .fetch_one(&mut *conn)
            .await?;
        Ok(total)
    }
}

pub struct TransactionRepository;

impl TransactionRepository {
    pub async fn insert(
        conn: &mut SqliteConnection,
        tx: &NewObservedTransaction,
    ) -> DisburseResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
                (block_number, block_hash, tx_hash, from_address, to_address, token_address,
                 value, gas_price, gas_limit, gas_used, nonce, transaction_index, status,
                 tx_type, input, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(tx.block_number)
        .bind(&tx.block_hash)
        .bind(&tx.tx_hash)
        .bind(&tx.from_address)
        .bind(&tx.to_address)
        .bind(&tx.token_address)
        .bind(&tx.value)
        .bind(&tx.gas_price)
        .bind(tx.gas_limit)
        .bind(tx.gas_used)
        .bind(tx.nonce)
        .bind(tx.transaction_index)
        .bind(tx.status)
        .bind(tx.tx_type)
        .bind(&tx.input)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DisburseError::ReconciliationConflict(format!(
                "transaction {} already recorded",
                tx.tx_hash
            )));
        }
        Ok(())
    }

    pub async fn find_by_hash(
        conn: &mut SqliteConnection,
        tx_hash: &str,
    ) -> DisburseResult<Option<ObservedTransaction>> {
        let tx = sqlx::query_as::<_, ObservedTransaction>(
            "SELECT * FROM transactions WHERE tx_hash = ?1",
        )
        .bind(tx_hash)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(tx)
    }

    pub async fn count(conn: &mut SqliteConnection) -> DisburseResult<i64> {
        let total = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&mut *conn)
            .await?;
        Ok(total)
    }
}
