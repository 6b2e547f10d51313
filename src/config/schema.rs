//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the capsule client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CapsuleConfig {
    /// Chain endpoint and contract settings.
    pub chain: ChainConfig,

    /// Key source and balance subscription settings.
    pub wallet: WalletConfig,

    /// Display timings for action status messages.
    pub timing: TimingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Chain connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Address of the deployed time capsule contract.
    pub contract_address: String,

    /// Decimal precision of the native token.
    pub decimals: u8,

    /// How often the node is asked for a new head, in milliseconds.
    pub block_poll_interval_ms: u64,

    /// Expected block time, used for unlock countdowns.
    pub block_time_secs: u64,

    /// Blocks on top of the inclusion block before a transaction counts as finalized.
    pub confirmation_blocks: u32,

    /// Maximum time to wait for a submitted transaction to finalize.
    pub tx_timeout_secs: u64,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 10,
            contract_address: "0x0000000000000000000000000000000000000000".to_string(),
            decimals: 18,
            block_poll_interval_ms: 2000,
            block_time_secs: 6,
            confirmation_blocks: 2,
            tx_timeout_secs: 120,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
        }
    }
}

/// Key source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Name the client presents when asking the key source for access.
    pub app_name: String,

    /// Environment variable holding the signing keys.
    pub keys_env_var: String,

    /// Balance refresh interval for the selected account, in milliseconds.
    pub balance_poll_interval_ms: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            app_name: "Chrono-Capsule".to_string(),
            keys_env_var: "CHRONO_CAPSULE_KEYS".to_string(),
            balance_poll_interval_ms: 6000,
        }
    }
}

/// Status display timings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a final status stays visible before the follow-up (form reset, refresh).
    pub status_display_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            status_display_ms: 3000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
