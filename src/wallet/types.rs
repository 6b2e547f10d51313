//! Wallet error definitions.

use alloy::primitives::Address;
use thiserror::Error;

/// Errors from key discovery and account selection.
#[derive(Debug, Error)]
pub enum WalletError {
    /// No key source is installed or configured.
    #[error("No key source available: {0}")]
    NoSource(String),

    /// The key source refused access for this session.
    #[error("Access denied by key source: {0}")]
    Denied(String),

    /// A key could not be parsed.
    #[error("Invalid private key format: {0}")]
    InvalidKey(String),

    /// The key source granted access but exposes no accounts.
    #[error("Key source returned no accounts")]
    NoAccounts,

    /// Selection of an address that was not discovered.
    #[error("Account {0} was not discovered by the key source")]
    UnknownAccount(Address),
}

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;
