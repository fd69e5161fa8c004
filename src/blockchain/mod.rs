//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment variable (signer key), config (RPC URLs)
//!     → wallet.rs (key loading, EIP-155 signing)
//!     → client.rs (LedgerClient: RPC with timeouts and failover)
//!     → transaction.rs (ERC-20 call data, fee bump, signing)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{LedgerClient, RpcLedgerClient};
pub use transaction::{PreparedTransfer, TransferTxBuilder};
pub use types::{BlockHeader, BlockchainError, BlockchainResult, ChainBlock, TxReceipt};
pub use wallet::{SignedTransfer, Wallet};
