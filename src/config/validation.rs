//! Configuration validation.
//!
//! Serde handles the syntax; this pass checks values that would only fail
//! later at connect time. Every problem is reported, not just the first.

use alloy::primitives::Address;

use crate::config::schema::CapsuleConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check(errors: &mut Vec<ValidationError>, ok: bool, field: &'static str, message: impl Into<String>) {
    if !ok {
        errors.push(ValidationError {
            field,
            message: message.into(),
        });
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &CapsuleConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let chain = &config.chain;

    if let Err(e) = chain.rpc_url.parse::<url::Url>() {
        check(&mut errors, false, "chain.rpc_url", format!("invalid URL '{}': {}", chain.rpc_url, e));
    }
    for url in &chain.failover_urls {
        if url.parse::<url::Url>().is_err() {
            check(&mut errors, false, "chain.failover_urls", format!("invalid URL '{}'", url));
        }
    }
    if let Err(e) = chain.contract_address.parse::<Address>() {
        check(
            &mut errors,
            false,
            "chain.contract_address",
            format!("invalid address '{}': {}", chain.contract_address, e),
        );
    }
    // U256 cannot hold 10^78 and above.
    check(&mut errors, chain.decimals <= 77, "chain.decimals", "must be at most 77");
    check(&mut errors, chain.rpc_timeout_secs > 0, "chain.rpc_timeout_secs", "must be positive");
    check(&mut errors, chain.block_poll_interval_ms > 0, "chain.block_poll_interval_ms", "must be positive");
    check(&mut errors, chain.tx_timeout_secs > 0, "chain.tx_timeout_secs", "must be positive");
    check(
        &mut errors,
        chain.gas_price_multiplier >= 1.0,
        "chain.gas_price_multiplier",
        "must be at least 1.0",
    );
    check(
        &mut errors,
        config.wallet.balance_poll_interval_ms > 0,
        "wallet.balance_poll_interval_ms",
        "must be positive",
    );
    check(
        &mut errors,
        !config.wallet.keys_env_var.is_empty(),
        "wallet.keys_env_var",
        "must not be empty",
    );
    if config.observability.metrics_enabled {
        check(
            &mut errors,
            config.observability.metrics_address.parse::<std::net::SocketAddr>().is_ok(),
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
