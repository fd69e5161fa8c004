//! Row types and enums persisted in the ledger store.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Canonical text form of an address: `0x`-prefixed lowercase hex.
pub fn address_key(address: &Address) -> String {
    format!("{address:#x}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Approved,
    Rejected,
}

impl Vote {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Approved => "approved",
            Vote::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Success,
    Failed,
}

/// Approver privilege. `Full` lets a creator skip the vote entirely.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    None,
    Partial,
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub contract_address: String,
    pub decimals: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Approver {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub permission_level: PermissionLevel,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub id: i64,
    pub destination: String,
    pub token_id: i64,
    /// Base units, decimal string.
    pub amount: String,
    pub description: String,
    pub status: IntentStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIntent {
    pub destination: String,
    pub token_id: i64,
    pub amount: String,
    pub description: String,
    pub status: IntentStatus,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: i64,
    pub intent_id: i64,
    pub approver_id: String,
    pub approver_address: String,
    pub vote: Vote,
    pub voted_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TransferJob {
    pub id: i64,
    pub intent_id: i64,
    pub token_id: i64,
    pub from_address: String,
    pub to_address: String,
    pub contract_address: String,
    pub amount: String,
    pub transfer_data: String,
    pub status: TransferStatus,
    pub retry_count: i64,
    /// Empty when nothing is in flight.
    pub tx_hash: String,
    pub tx_nonce: Option<i64>,
    #[serde(skip_serializing, default)]
    pub signed_tx: String,
    pub last_error: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at_ms: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TransferJob {
    pub fn has_in_flight(&self) -> bool {
        !self.tx_hash.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct NewTransferJob {
    pub intent_id: i64,
    pub token_id: i64,
    pub to_address: String,
    pub contract_address: String,
    pub amount: String,
    pub created_by: String,
}

impl NewTransferJob {
    /// Job addressed from an approved intent and its token.
    pub fn for_intent(intent: &Intent, token: &Token, created_by: &str) -> Self {
        Self {
            intent_id: intent.id,
            token_id: token.id,
            to_address: intent.destination.clone(),
            contract_address: token.contract_address.clone(),
            amount: intent.amount.clone(),
            created_by: created_by.to_string(),
        }
    }
}

/// One signed transaction of a job. Replacements share a nonce.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TransferAttempt {
    pub id: i64,
    pub job_id: i64,
    pub tx_hash: String,
    pub tx_nonce: i64,
    #[serde(skip_serializing, default)]
    pub signed_tx: String,
    pub worker_id: String,
    pub created_at: DateTime<Utc>,
}

/// Hash, raw bytes and nonce of the transaction a job is waiting on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InFlight {
    pub tx_hash: String,
    pub signed_tx: String,
    pub tx_nonce: Option<i64>,
}

impl InFlight {
    pub fn of(job: &TransferJob) -> Self {
        Self {
            tx_hash: job.tx_hash.clone(),
            signed_tx: job.signed_tx.clone(),
            tx_nonce: job.tx_nonce,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub id: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub parent_hash: String,
    pub timestamp: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ObservedTransaction {
    pub id: i64,
    pub block_number: i64,
    pub block_hash: String,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub token_address: String,
    pub value: String,
    pub gas_price: String,
    pub gas_limit: i64,
    pub gas_used: i64,
    pub nonce: i64,
    pub transaction_index: i64,
    pub status: i64,
    pub tx_type: i64,
    pub input: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewObservedTransaction {
    pub block_number: i64,
    pub block_hash: String,
    pub tx_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub token_address: String,
    pub value: String,
    pub gas_price: String,
    pub gas_limit: i64,
    pub gas_used: i64,
    pub nonce: i64,
    pub transaction_index: i64,
    pub status: i64,
    pub tx_type: i64,
    pub input: String,
}

/// Paging parameters as they arrive from a query string.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page_num: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageRequest {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;

    pub fn new(page_num: u32, page_size: u32) -> Self {
        Self {
            page_num: Some(page_num),
            page_size: Some(page_size),
        }
    }

    /// Page number, at least 1.
    pub fn num(&self) -> u32 {
        self.page_num.filter(|n| *n > 0).unwrap_or(1)
    }

    /// Page size, defaulted and capped.
    pub fn size(&self) -> u32 {
        self.page_size
            .filter(|n| *n > 0)
            .unwrap_or(Self::DEFAULT_SIZE)
            .min(Self::MAX_SIZE)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.num() - 1) * i64::from(self.size())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page_num: u32,
    pub page_size: u32,
    pub total_page: u32,
    pub list: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total: i64, list: Vec<T>) -> Self {
        let size = i64::from(request.size());
        let total_page = (total.max(0) + size - 1) / size;
        Self {
            page_num: request.num(),
            page_size: request.size(),
            total_page: u32::try_from(total_page).unwrap_or(u32::MAX),
            list,
        }
    }
}
