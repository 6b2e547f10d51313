//! Signing accounts.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables or memory
//! - Keys are never logged or serialized

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;

use crate::wallet::types::{WalletError, WalletResult};

/// A discovered account able to sign transactions.
#[derive(Clone)]
pub struct Account {
    /// Display name given by the key source.
    name: String,
    /// The underlying signer (private key).
    signer: PrivateKeySigner,
}

impl Account {
    /// Create an account from a hex-encoded private key string.
    ///
    /// # Arguments
    /// * `name` - Display name
    /// * `private_key_hex` - Hex string (with or without 0x prefix)
    pub fn from_private_key(name: impl Into<String>, private_key_hex: &str) -> WalletResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| WalletError::InvalidKey(format!("{}", e)))?;

        Ok(Self {
            name: name.into(),
            signer,
        })
    }

    /// Get the account's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signer for transaction submission.
    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// `name (0x1234...abcd)` label for account pickers.
    pub fn label(&self) -> String {
        let address = self.address().to_string();
        format!(
            "{} ({}...{})",
            self.name,
            &address[..6],
            &address[address.len() - 4..]
        )
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("name", &self.name)
            .field("address", &self.address())
            .finish()
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl Eq for Account {}
