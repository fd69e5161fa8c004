//! Configuration validation.
//!
//! Semantic checks run after serde has accepted the file. Every problem is
//! collected so an operator sees the full list in one run.

use std::net::SocketAddr;

use alloy::primitives::Address;
use thiserror::Error;

use crate::config::schema::AppConfig;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, returning every violation found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }

    if config.database.url.is_empty() {
        errors.push(ValidationError::new("database.url", "must not be empty"));
    }
    if config.database.max_connections == 0 {
        errors.push(ValidationError::new("database.max_connections", "must be > 0"));
    }

    let chain = &config.blockchain;
    for (field, url) in std::iter::once(("blockchain.rpc_url", &chain.rpc_url))
        .chain(chain.failover_urls.iter().map(|u| ("blockchain.failover_urls", u)))
    {
        if url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new(field, format!("'{url}' is not a URL")));
        }
    }
    if chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("blockchain.rpc_timeout_secs", "must be > 0"));
    }
    if chain.dial_attempts == 0 {
        errors.push(ValidationError::new("blockchain.dial_attempts", "must be > 0"));
    }
    if chain.dial_backoff_base_ms > chain.dial_backoff_max_ms {
        errors.push(ValidationError::new(
            "blockchain.dial_backoff_base_ms",
            "must not exceed dial_backoff_max_ms",
        ));
    }
    if chain.signer_key_env.is_empty() {
        errors.push(ValidationError::new("blockchain.signer_key_env", "must not be empty"));
    }

    if config.approval.quorum == 0 {
        errors.push(ValidationError::new("approval.quorum", "must be > 0"));
    }

    let outbox = &config.outbox;
    if outbox.interval_ms == 0 {
        errors.push(ValidationError::new("outbox.interval_ms", "must be > 0"));
    }
    if outbox.batch_size == 0 {
        errors.push(ValidationError::new("outbox.batch_size", "must be > 0"));
    }
    if outbox.attempts_per_tick == 0 {
        errors.push(ValidationError::new("outbox.attempts_per_tick", "must be > 0"));
    }
    if outbox.receipt_poll_attempts == 0 {
        errors.push(ValidationError::new("outbox.receipt_poll_attempts", "must be > 0"));
    }
    if outbox.gas_limit < 21_000 {
        errors.push(ValidationError::new("outbox.gas_limit", "must be at least 21000"));
    }
    let renewal_gap_ms = longest_renewal_gap_ms(config);
    if outbox.lease_timeout_secs.saturating_mul(1000) <= renewal_gap_ms {
        errors.push(ValidationError::new(
            "outbox.lease_timeout_secs",
            format!("must exceed {renewal_gap_ms} ms, the longest a live worker goes without renewing its lease"),
        ));
    }

    if config.scanner.interval_ms == 0 {
        errors.push(ValidationError::new("scanner.interval_ms", "must be > 0"));
    }
    if config.scanner.window == 0 {
        errors.push(ValidationError::new("scanner.window", "must be > 0"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    for token in &config.registry.tokens {
        if token.contract_address.parse::<Address>().is_err() {
            errors.push(ValidationError::new(
                "registry.tokens",
                format!("'{}' has an invalid contract address", token.symbol),
            ));
        }
    }
    for approver in &config.registry.approvers {
        if approver.address.parse::<Address>().is_err() {
            errors.push(ValidationError::new(
                "registry.approvers",
                format!("'{}' has an invalid address", approver.name),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Between two lease renewals the outbox makes at most two RPC calls
/// (fee and nonce while signing), or one receipt lookup followed by the
/// pause before the next poll or attempt. Each call may run into the
/// timeout once per provider.
fn longest_renewal_gap_ms(config: &AppConfig) -> u64 {
    let providers = 1 + config.blockchain.failover_urls.len() as u64;
    let call_ms = config
        .blockchain
        .rpc_timeout_secs
        .saturating_mul(1000)
        .saturating_mul(providers);
    let pause_ms = config
        .outbox
        .receipt_poll_interval_ms
        .max(config.outbox.attempt_delay_ms);
    call_ms.saturating_mul(2).max(call_ms.saturating_add(pause_ms))
}
