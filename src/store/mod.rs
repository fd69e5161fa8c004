//! Ledger store: the only state shared by the approval, outbox and scanner
//! subsystems.
//!
//! # Layout
//! ```text
//! LedgerStore (pool, migrations, registry seeding)
//!     → tokens.rs / approvers.rs   reference tables
//!     → intents.rs / approvals.rs  approval state machine
//!     → transfer_jobs.rs           outbox rows and leases
//!     → transfer_attempts.rs       every transaction signed per job
//!     → blocks.rs                  observed chain state
//! ```
//!
//! Repositories operate on a `&mut SqliteConnection`, so callers decide
//! whether a call runs inside a transaction (`&mut *tx`) or on a plain
//! pooled connection.

pub mod approvals;
pub mod approvers;
pub mod blocks;
pub mod intents;
pub mod models;
pub mod tokens;
pub mod transfer_attempts;
pub mod transfer_jobs;

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use crate::config::schema::RegistryConfig;
use crate::config::DatabaseConfig;
use crate::error::{DisburseError, DisburseResult};

pub use approvals::ApprovalRepository;
pub use approvers::ApproverRepository;
pub use blocks::{BlockRepository, TransactionRepository};
pub use intents::IntentRepository;
pub use models::*;
pub use tokens::TokenRepository;
pub use transfer_attempts::TransferAttemptRepository;
pub use transfer_jobs::{ClaimRequest, TransferJobRepository};

#[derive(Clone, Debug)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Open the configured database and apply pending migrations.
    pub async fn connect(config: &DatabaseConfig) -> DisburseResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(url = %config.url, "Ledger store ready");
        Ok(store)
    }

    /// Private in-memory database, migrated. One connection keeps it alive.
    pub async fn in_memory() -> DisburseResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> DisburseResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> DisburseResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn acquire(&self) -> DisburseResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Upsert configured tokens and approvers in one transaction.
    pub async fn seed_registry(&self, registry: &RegistryConfig) -> DisburseResult<()> {
        let mut tx = self.begin().await?;

        for entry in &registry.tokens {
            let address = parse_address(&entry.contract_address)?;
            let token = TokenRepository::upsert(&mut tx, entry, &address_key(&address)).await?;
            tracing::debug!(token_id = token.id, symbol = %token.symbol, "Token registered");
        }

        for entry in &registry.approvers {
            let address = parse_address(&entry.address)?;
            let approver =
                ApproverRepository::upsert(&mut tx, entry, &address_key(&address)).await?;
            tracing::debug!(
                approver_id = approver.id,
                permission = ?approver.permission_level,
                "Approver registered"
            );
        }

        tx.commit().await?;
        tracing::info!(
            tokens = registry.tokens.len(),
            approvers = registry.approvers.len(),
            "Registry seeded"
        );
        Ok(())
    }
}

fn parse_address(raw: &str) -> DisburseResult<Address> {
    raw.parse()
        .map_err(|_| DisburseError::Validation(format!("invalid address '{raw}'")))
}
