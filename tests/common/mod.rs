//! Shared fixtures for the integration tests: an in-process ledger that mines
//! on demand, plus store, wallet and config helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use quorum_disburser::approval::{ApprovalService, CreateIntentRequest};
use quorum_disburser::blockchain::transaction::IERC20;
use quorum_disburser::blockchain::{
    BlockHeader, BlockchainError, BlockchainResult, ChainBlock, LedgerClient, TxReceipt, Wallet,
};
use quorum_disburser::config::schema::{ApproverEntry, RegistryConfig, TokenEntry};
use quorum_disburser::config::{ApprovalConfig, OutboxConfig, ScannerConfig};
use quorum_disburser::store::{
    LedgerStore, PermissionLevel, TokenRepository, TransferJob, TransferJobRepository,
};
use quorum_disburser::OutboxEngine;

/// Anvil account #0, the disbursing signer.
pub const SIGNER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
/// Anvil account #1, an unrelated sender.
pub const OTHER_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const CHAIN_ID: u64 = 31337;

pub const TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
/// Full permission.
pub const TREASURY: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
/// Partial permission.
pub const FINANCE: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";
/// Partial permission.
pub const OPS: &str = "0x90F79bf6EB2c4f870365E62B51Ea8bDB3F84e0cF";
pub const RECIPIENT: &str = "0x15d34AAf54267DB7D7c367839AAf71A00a2C6A65";

pub const GAS_PRICE: u128 = 1_000_000_000;

#[derive(Default)]
struct LedgerState {
    blocks: Vec<ChainBlock>,
    pending: Vec<(Address, TxEnvelope)>,
    receipts: HashMap<TxHash, TxReceipt>,
    nonces: HashMap<Address, u64>,
    balances: HashMap<(Address, Address), U256>,
    accepted: Vec<TxHash>,
    auto_mine: bool,
    revert: bool,
    hide_receipts: bool,
    withheld: HashSet<TxHash>,
    failing_headers: HashSet<u64>,
    fail_submissions: u32,
    lost_responses: u32,
    finality_lag: u64,
}

impl LedgerState {
    fn head(&self) -> &BlockHeader {
        &self.blocks.last().expect("genesis block").header
    }

    fn finalized(&self) -> u64 {
        self.head().number.saturating_sub(self.finality_lag)
    }

    /// Seal every pending transaction whose nonce is next for its sender.
    fn mine(&mut self) -> u64 {
        let number = self.head().number + 1;
        let parent = self.head().hash;

        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|(from, envelope)| (*from, envelope.nonce()));

        let mut transactions = Vec::new();
        for (from, envelope) in pending {
            let expected = self.nonces.get(&from).copied().unwrap_or(0);
            if envelope.nonce() != expected {
                continue;
            }
            self.nonces.insert(from, expected + 1);

            let success = !self.revert;
            if success {
                if let (Some(token), Ok(call)) =
                    (envelope.to(), IERC20::transferCall::abi_decode(envelope.input()))
                {
                    *self.balances.entry((token, call.to)).or_default() += call.amount;
                }
            }

            let hash = *envelope.tx_hash();
            self.receipts.insert(
                hash,
                TxReceipt {
                    tx_hash: hash,
                    success,
                    gas_used: 51_000,
                    block_number: Some(number),
                    transaction_index: Some(transactions.len() as u64),
                },
            );
            transactions.push(envelope);
        }

        self.blocks.push(ChainBlock {
            header: header_for(number, parent),
            transactions,
        });
        number
    }
}

fn header_for(number: u64, parent_hash: B256) -> BlockHeader {
    BlockHeader {
        number,
        hash: keccak256(number.to_be_bytes()),
        parent_hash,
        timestamp: 1_700_000_000 + number * 12,
    }
}

/// A single-node chain held in memory. Auto-mines each accepted
/// transaction into its own block unless told otherwise.
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new() -> Self {
        let genesis = ChainBlock {
            header: header_for(0, B256::ZERO),
            transactions: Vec::new(),
        };
        Self {
            state: Mutex::new(LedgerState {
                blocks: vec![genesis],
                auto_mine: true,
                ..LedgerState::default()
            }),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    pub fn set_auto_mine(&self, on: bool) {
        self.state().auto_mine = on;
    }

    /// Transactions mined from now on revert.
    pub fn set_revert(&self, on: bool) {
        self.state().revert = on;
    }

    pub fn set_hide_receipts(&self, on: bool) {
        self.state().hide_receipts = on;
    }

    pub fn withhold_receipt(&self, hash: TxHash) {
        self.state().withheld.insert(hash);
    }

    pub fn release_receipt(&self, hash: TxHash) {
        self.state().withheld.remove(&hash);
    }

    pub fn fail_header(&self, number: u64) {
        self.state().failing_headers.insert(number);
    }

    pub fn clear_header_failures(&self) {
        self.state().failing_headers.clear();
    }

    /// The next `count` broadcasts fail as if the connection dropped.
    pub fn fail_next_submissions(&self, count: u32) {
        self.state().fail_submissions = count;
    }

    /// The next `count` broadcasts are accepted, but the caller sees a timeout.
    pub fn lose_next_responses(&self, count: u32) {
        self.state().lost_responses = count;
    }

    pub fn set_finality_lag(&self, lag: u64) {
        self.state().finality_lag = lag;
    }

    /// Broadcasts the node accepted.
    pub fn submissions(&self) -> usize {
        self.state().accepted.len()
    }

    pub fn accepted(&self) -> Vec<TxHash> {
        self.state().accepted.clone()
    }

    pub fn head(&self) -> u64 {
        self.state().head().number
    }

    pub fn mine_pending(&self) -> u64 {
        self.state().mine()
    }

    pub fn mine_empty(&self, count: u64) {
        let mut state = self.state();
        for _ in 0..count {
            state.mine();
        }
    }

    pub fn mined_transactions(&self) -> Vec<TxEnvelope> {
        self.state()
            .blocks
            .iter()
            .flat_map(|block| block.transactions.iter().cloned())
            .collect()
    }

    pub fn balance(&self, token: Address, owner: Address) -> U256 {
        self.state()
            .balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        let envelope = TxEnvelope::decode_2718(&mut &raw[..])
            .map_err(|e| BlockchainError::Encoding(e.to_string()))?;
        let from = envelope
            .recover_signer()
            .map_err(|e| BlockchainError::Rpc(e.to_string()))?;

        let mut state = self.state();
        if state.fail_submissions > 0 {
            state.fail_submissions -= 1;
            return Err(BlockchainError::Rpc("connection reset by peer".to_string()));
        }
        if envelope.nonce() < state.nonces.get(&from).copied().unwrap_or(0) {
            return Err(BlockchainError::NonceTooLow("nonce too low".to_string()));
        }

        let hash = *envelope.tx_hash();
        let nonce = envelope.nonce();
        state
            .pending
            .retain(|(sender, queued)| !(*sender == from && queued.nonce() == nonce));
        state.pending.push((from, envelope));
        state.accepted.push(hash);
        if state.auto_mine {
            state.mine();
        }
        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(BlockchainError::Timeout(100));
        }
        Ok(hash)
    }

    async fn nonce_of(&self, address: Address) -> BlockchainResult<u64> {
        Ok(self.state().nonces.get(&address).copied().unwrap_or(0))
    }

    async fn suggested_fee(&self) -> BlockchainResult<u128> {
        Ok(GAS_PRICE)
    }

    async fn finalized_header(&self) -> BlockchainResult<BlockHeader> {
        let state = self.state();
        let number = state.finalized();
        Ok(state.blocks[number as usize].header.clone())
    }

    async fn header_by_number(&self, number: u64) -> BlockchainResult<BlockHeader> {
        let state = self.state();
        if state.failing_headers.contains(&number) {
            return Err(BlockchainError::Rpc(format!("header {number} unavailable")));
        }
        state
            .blocks
            .get(number as usize)
            .map(|block| block.header.clone())
            .ok_or_else(|| BlockchainError::NotFound(format!("block {number}")))
    }

    async fn block_by_number(&self, number: u64) -> BlockchainResult<ChainBlock> {
        self.state()
            .blocks
            .get(number as usize)
            .cloned()
            .ok_or_else(|| BlockchainError::NotFound(format!("block {number}")))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        let state = self.state();
        if state.hide_receipts || state.withheld.contains(&hash) {
            return Ok(None);
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn token_balance_of(&self, token: Address, owner: Address) -> BlockchainResult<U256> {
        Ok(self.balance(token, owner))
    }
}

pub fn test_wallet() -> Wallet {
    Wallet::from_private_key(SIGNER_KEY, CHAIN_ID).unwrap()
}

pub fn other_wallet() -> Wallet {
    Wallet::from_private_key(OTHER_KEY, CHAIN_ID).unwrap()
}

pub fn token_address() -> Address {
    TOKEN.parse().unwrap()
}

pub fn recipient_address() -> Address {
    RECIPIENT.parse().unwrap()
}

pub fn registry() -> RegistryConfig {
    let approver = |name: &str, address: &str, permission| ApproverEntry {
        name: name.to_string(),
        address: address.to_string(),
        permission,
    };
    RegistryConfig {
        tokens: vec![TokenEntry {
            name: "Test Token".to_string(),
            symbol: "TST".to_string(),
            contract_address: TOKEN.to_string(),
            decimals: 18,
        }],
        approvers: vec![
            approver("treasury", TREASURY, PermissionLevel::Full),
            approver("finance", FINANCE, PermissionLevel::Partial),
            approver("ops", OPS, PermissionLevel::Partial),
        ],
    }
}

/// Migrated in-memory store with the test registry.
pub async fn seeded_store() -> LedgerStore {
    let store = LedgerStore::in_memory().await.unwrap();
    store.seed_registry(&registry()).await.unwrap();
    store
}

pub async fn token_id(store: &LedgerStore) -> i64 {
    let mut conn = store.acquire().await.unwrap();
    TokenRepository::list(&mut conn).await.unwrap()[0].id
}

pub fn approval_service(store: &LedgerStore) -> ApprovalService {
    ApprovalService::new(store.clone(), ApprovalConfig { quorum: 2 })
}

pub async fn intent_request(store: &LedgerStore, amount: &str, creator: &str) -> CreateIntentRequest {
    CreateIntentRequest {
        destination: RECIPIENT.to_string(),
        token_id: token_id(store).await,
        amount: amount.to_string(),
        description: "contributor payout".to_string(),
        creator: creator.to_string(),
    }
}

/// An intent created by the full-permission approver, so its job exists at once.
pub async fn approved_job(store: &LedgerStore, amount: &str) -> TransferJob {
    let request = intent_request(store, amount, TREASURY).await;
    let intent = approval_service(store).create_intent(request).await.unwrap();
    let mut conn = store.acquire().await.unwrap();
    TransferJobRepository::find_by_intent(&mut conn, intent.id)
        .await
        .unwrap()
        .unwrap()
}

pub async fn load_job(store: &LedgerStore, id: i64) -> TransferJob {
    let mut conn = store.acquire().await.unwrap();
    TransferJobRepository::find(&mut conn, id).await.unwrap().unwrap()
}

/// Outbox settings that keep ticks in the millisecond range.
pub fn fast_outbox() -> OutboxConfig {
    OutboxConfig {
        interval_ms: 10,
        attempt_delay_ms: 0,
        receipt_poll_attempts: 2,
        receipt_poll_interval_ms: 5,
        ..OutboxConfig::default()
    }
}

pub fn scanner_config(window: u64) -> ScannerConfig {
    ScannerConfig {
        interval_ms: 10,
        window,
        ..ScannerConfig::default()
    }
}

pub fn engine(store: &LedgerStore, ledger: &Arc<MockLedger>, config: OutboxConfig) -> OutboxEngine {
    OutboxEngine::new(store.clone(), ledger.clone(), test_wallet(), config)
}
