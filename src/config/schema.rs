//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the disburser.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::store::models::PermissionLevel;

/// Root configuration for the disburser.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP API listener.
    pub server: ServerConfig,

    /// Ledger store connection.
    pub database: DatabaseConfig,

    /// Remote node access and signing.
    pub blockchain: BlockchainConfig,

    /// Quorum settings.
    pub approval: ApprovalConfig,

    /// Transfer outbox worker.
    pub outbox: OutboxConfig,

    /// Chain reconciliation scanner.
    pub scanner: ScannerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Tokens and approvers seeded into the reference tables at startup.
    pub registry: RegistryConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://disburser.db?mode=rwc`.
    pub url: String,

    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://disburser.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs, tried in order.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Connection attempts before giving up at startup.
    pub dial_attempts: u32,

    /// Base delay for dial backoff in milliseconds.
    pub dial_backoff_base_ms: u64,

    /// Maximum delay for dial backoff in milliseconds.
    pub dial_backoff_max_ms: u64,

    /// Name of the environment variable holding the signer key.
    pub signer_key_env: String,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 100,
            dial_attempts: 5,
            dial_backoff_base_ms: 500,
            dial_backoff_max_ms: 10_000,
            signer_key_env: "DISBURSER_SIGNER_PRIVATE_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Distinct approving addresses required to approve an intent.
    pub quorum: u32,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { quorum: 2 }
    }
}

/// Transfer outbox configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub enabled: bool,

    /// Tick interval in milliseconds.
    pub interval_ms: u64,

    /// Jobs claimed per tick.
    pub batch_size: u32,

    /// Exhausted ticks after which a job is no longer picked up.
    pub retry_cap: u32,

    /// Submission attempts within one tick.
    pub attempts_per_tick: u32,

    /// Delay between attempts in milliseconds.
    pub attempt_delay_ms: u64,

    /// Fee increase per attempt, in percent of the suggested fee.
    pub fee_bump_percent: u64,

    pub gas_limit: u64,

    pub receipt_poll_attempts: u32,

    pub receipt_poll_interval_ms: u64,

    /// Claims not renewed for this long are considered abandoned. Must
    /// outlast the longest stretch between renewals, see `validate_config`.
    pub lease_timeout_secs: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            batch_size: 10,
            retry_cap: 3,
            attempts_per_tick: 3,
            attempt_delay_ms: 2_000,
            fee_bump_percent: 20,
            gas_limit: 300_000,
            receipt_poll_attempts: 30,
            receipt_poll_interval_ms: 2_000,
            lease_timeout_secs: 300,
        }
    }
}

/// Chain reconciliation scanner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,

    /// Tick interval in milliseconds.
    pub interval_ms: u64,

    /// Maximum blocks per batch.
    pub window: u64,

    /// First block scanned when the store is empty (inclusive).
    pub start_block: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5_000,
            window: 100,
            start_block: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    pub tokens: Vec<TokenEntry>,
    pub approvers: Vec<ApproverEntry>,
}

/// A token the disburser is allowed to transfer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenEntry {
    pub name: String,
    pub symbol: String,
    pub contract_address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

fn default_decimals() -> u8 {
    18
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApproverEntry {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub permission: PermissionLevel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.approval.quorum, 2);
        assert_eq!(config.outbox.retry_cap, 3);
        assert_eq!(config.outbox.gas_limit, 300_000);
        assert_eq!(config.outbox.fee_bump_percent, 20);
        assert_eq!(config.scanner.window, 100);
        assert_eq!(config.blockchain.rpc_timeout_secs, 100);
        assert_eq!(config.blockchain.dial_attempts, 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [approval]
            quorum = 3

            [observability]
            log_format = "json"

            [[registry.approvers]]
            name = "ops"
            address = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
            permission = "full"
            "#,
        )
        .unwrap();

        assert_eq!(config.approval.quorum, 3);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.outbox.batch_size, 10);
        assert_eq!(config.registry.approvers[0].permission, PermissionLevel::Full);
    }
}
