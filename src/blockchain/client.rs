//! Ledger client: the narrow capability set the disburser needs from a node.
//!
//! # Responsibilities
//! - Submit raw signed transactions
//! - Query nonce, fee, headers, blocks, receipts and token balances
//! - Enforce a deadline on every RPC call and fail over between endpoints

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::TxEnvelope;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Block, TransactionRequest};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::timeout;

use crate::blockchain::transaction::IERC20;
use crate::blockchain::types::{
    BlockHeader, BlockchainError, BlockchainResult, ChainBlock, TxReceipt,
};
use crate::config::BlockchainConfig;
use crate::resilience::{retry_with_backoff, ExponentialBackoff};

/// Operations the approval, outbox and scanner subsystems need from a node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Broadcast an EIP-2718 encoded signed transaction.
    async fn submit_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash>;

    /// Next nonce for `address` according to mined state.
    async fn nonce_of(&self, address: Address) -> BlockchainResult<u64>;

    /// Node-suggested fee in wei.
    async fn suggested_fee(&self) -> BlockchainResult<u128>;

    /// Most recent finalized header.
    async fn finalized_header(&self) -> BlockchainResult<BlockHeader>;

    async fn header_by_number(&self, number: u64) -> BlockchainResult<BlockHeader>;

    /// Headers for `from..=to`, fetched concurrently.
    ///
    /// Returns the prefix fetched before the first failure; fails only if
    /// nothing could be fetched.
    async fn headers_by_range(&self, from: u64, to: u64) -> BlockchainResult<Vec<BlockHeader>> {
        if from > to {
            return Ok(Vec::new());
        }

        let results = join_all((from..=to).map(|n| self.header_by_number(n))).await;
        let mut headers = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(header) => headers.push(header),
                Err(e) if headers.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        fetched = headers.len(),
                        error = %e,
                        "Header range truncated at first failure"
                    );
                    break;
                }
            }
        }
        Ok(headers)
    }

    /// Block with full transaction bodies.
    async fn block_by_number(&self, number: u64) -> BlockchainResult<ChainBlock>;

    /// `None` while the transaction is not yet visible.
    async fn transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>>;

    /// ERC-20 `balanceOf(owner)` on `token`.
    async fn token_balance_of(&self, token: Address, owner: Address) -> BlockchainResult<U256>;
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// JSON-RPC ledger client with failover support.
#[derive(Clone)]
pub struct RpcLedgerClient {
    /// Primary first, then failovers in configured order.
    providers: Vec<DynProvider>,
    config: BlockchainConfig,
    timeout_duration: Duration,
}

impl RpcLedgerClient {
    /// Build providers without touching the network.
    pub fn new(config: BlockchainConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse::<url::Url>() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        Ok(Self {
            providers,
            config,
            timeout_duration,
        })
    }

    /// Build providers and confirm the node serves the configured chain.
    ///
    /// Reaching the node is retried with backoff up to `dial_attempts` times;
    /// a chain ID mismatch fails immediately.
    pub async fn connect(config: BlockchainConfig) -> BlockchainResult<Self> {
        let client = Self::new(config)?;
        let policy = ExponentialBackoff::new(
            client.config.dial_backoff_base_ms,
            client.config.dial_backoff_max_ms,
        );

        let actual = retry_with_backoff(client.config.dial_attempts, policy, || {
            client.chain_id()
        })
        .await
        .map_err(|(attempts, e)| BlockchainError::Dial {
            attempts,
            last_error: e.to_string(),
        })?;

        if actual != client.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: client.config.chain_id,
                actual,
            });
        }

        tracing::info!(
            rpc_url = %client.config.rpc_url,
            failovers = client.providers.len() - 1,
            chain_id = actual,
            "Ledger client connected"
        );
        Ok(client)
    }

    pub async fn chain_id(&self) -> BlockchainResult<u64> {
        self.call("eth_chainId", |p| async move {
            p.get_chain_id().await.map_err(rpc_error)
        })
        .await
    }

    /// Run `op` against each provider in order until one answers in time.
    async fn call<T, F, Fut>(&self, method: &'static str, op: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = BlockchainResult<T>>,
    {
        let mut last_error = BlockchainError::Rpc("No RPC providers configured".to_string());

        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, op(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e @ (BlockchainError::NotFound(_) | BlockchainError::NonceTooLow(_)))) => {
                    return Err(e);
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, method = method, error = %e, "RPC error, trying next provider");
                    last_error = e;
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, method = method, "RPC timeout, trying next provider");
                    last_error = BlockchainError::Timeout(self.timeout_duration.as_secs());
                }
            }
        }

        Err(last_error)
    }

    async fn block(&self, tag: BlockNumberOrTag, full: bool) -> BlockchainResult<Block> {
        self.call("eth_getBlockByNumber", |p| async move {
            let request = p.get_block_by_number(tag);
            let block = if full {
                request.full().await
            } else {
                request.await
            };
            block
                .map_err(rpc_error)?
                .ok_or_else(|| BlockchainError::NotFound(format!("block {tag}")))
        })
        .await
    }
}

fn rpc_error<E: std::fmt::Display>(e: E) -> BlockchainError {
    BlockchainError::Rpc(e.to_string())
}

/// Broadcast errors, with an already-used nonce split out as a definite rejection.
fn submit_error<E: std::fmt::Display>(e: E) -> BlockchainError {
    let message = e.to_string();
    if message.to_ascii_lowercase().contains("nonce too low") {
        BlockchainError::NonceTooLow(message)
    } else {
        BlockchainError::Rpc(message)
    }
}

fn header_of(block: &Block) -> BlockHeader {
    BlockHeader {
        number: block.header.number,
        hash: block.header.hash,
        parent_hash: block.header.parent_hash,
        timestamp: block.header.timestamp,
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn submit_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        self.call("eth_sendRawTransaction", |p| async move {
            let pending = p.send_raw_transaction(raw).await.map_err(submit_error)?;
            Ok(*pending.tx_hash())
        })
        .await
    }

    async fn nonce_of(&self, address: Address) -> BlockchainResult<u64> {
        self.call("eth_getTransactionCount", |p| async move {
            p.get_transaction_count(address).await.map_err(rpc_error)
        })
        .await
    }

    async fn suggested_fee(&self) -> BlockchainResult<u128> {
        self.call("eth_gasPrice", |p| async move {
            p.get_gas_price().await.map_err(rpc_error)
        })
        .await
    }

    async fn finalized_header(&self) -> BlockchainResult<BlockHeader> {
        let block = self.block(BlockNumberOrTag::Finalized, false).await?;
        Ok(header_of(&block))
    }

    async fn header_by_number(&self, number: u64) -> BlockchainResult<BlockHeader> {
        let block = self.block(BlockNumberOrTag::Number(number), false).await?;
        Ok(header_of(&block))
    }

    async fn block_by_number(&self, number: u64) -> BlockchainResult<ChainBlock> {
        let block = self.block(BlockNumberOrTag::Number(number), true).await?;
        let header = header_of(&block);
        let transactions: Vec<TxEnvelope> = block
            .transactions
            .into_transactions()
            .map(|tx| tx.inner.into_inner())
            .collect();

        Ok(ChainBlock {
            header,
            transactions,
        })
    }

    async fn transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        self.call("eth_getTransactionReceipt", |p| async move {
            let receipt = p.get_transaction_receipt(hash).await.map_err(rpc_error)?;
            Ok(receipt.map(|r| TxReceipt {
                tx_hash: r.transaction_hash,
                success: r.status(),
                gas_used: r.gas_used,
                block_number: r.block_number,
                transaction_index: r.transaction_index,
            }))
        })
        .await
    }

    async fn token_balance_of(&self, token: Address, owner: Address) -> BlockchainResult<U256> {
        let data = IERC20::balanceOfCall { account: owner }.abi_encode();
        self.call("eth_call", |p| {
            let request = TransactionRequest::default()
                .with_to(token)
                .with_input(data.clone());
            async move {
                let output = p.call(request).await.map_err(rpc_error)?;
                IERC20::balanceOfCall::abi_decode_returns(&output)
                    .map_err(|e| BlockchainError::Encoding(e.to_string()))
            }
        })
        .await
    }
}

impl std::fmt::Debug for RpcLedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedgerClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("providers", &self.providers.len())
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}
