//! Quorum-gated token disbursement.
//!
//! Intents are approved by a quorum of independent approvers, submitted
//! on-chain by a retrying outbox, and independently confirmed by a chain
//! scanner. The three subsystems share nothing but the ledger store.

pub mod approval;
pub mod blockchain;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod outbox;
pub mod resilience;
pub mod scanner;
pub mod store;

pub use approval::ApprovalService;
pub use config::AppConfig;
pub use error::{DisburseError, DisburseResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use outbox::OutboxEngine;
pub use scanner::ChainScanner;
pub use store::LedgerStore;
