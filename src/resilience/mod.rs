//! Resilience helpers for remote calls.
//!
//! Per-call deadlines live in the ledger client; this module supplies the
//! jittered exponential backoff used when dialling the node.

pub mod backoff;
pub mod retries;

pub use backoff::ExponentialBackoff;
pub use retries::retry_with_backoff;
