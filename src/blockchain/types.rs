//! Chain-specific types and error definitions.

use alloy::consensus::TxEnvelope;
use alloy::primitives::{TxHash, B256};
use thiserror::Error;

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// The node refused the transaction because its nonce is already used.
    #[error("Nonce too low: {0}")]
    NonceTooLow(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Transaction could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The node does not know the requested block or header.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Could not reach any endpoint after all dial attempts.
    #[error("Dial failed after {attempts} attempts: {last_error}")]
    Dial { attempts: u32, last_error: String },
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// The subset of a block header the scanner persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
}

/// A block with its full signed transactions.
#[derive(Debug, Clone)]
pub struct ChainBlock {
    pub header: BlockHeader,
    pub transactions: Vec<TxEnvelope>,
}

/// Execution outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
    pub block_number: Option<u64>,
    pub transaction_index: Option<u64>,
}
