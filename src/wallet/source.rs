//! Key sources: where signing accounts come from.
//!
//! A source must be asked for access once per session before it reveals
//! any account. The environment source reads keys the operator exported for
//! this process; the static source serves embedders and tests.

use async_trait::async_trait;

use crate::wallet::account::Account;
use crate::wallet::types::{WalletError, WalletResult};

/// Provider of signing accounts behind a per-session permission.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Request access on behalf of `app_name` and list the accounts granted.
    async fn enable(&self, app_name: &str) -> WalletResult<Vec<Account>>;
}

/// Reads `name=key` pairs (or bare keys) separated by commas from an
/// environment variable.
#[derive(Debug, Clone)]
pub struct EnvKeySource {
    var: String,
}

impl EnvKeySource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

/// Parse the `name=key,name=key` list. Bare keys get `Account N` names.
pub fn parse_key_list(raw: &str) -> WalletResult<Vec<Account>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .enumerate()
        .map(|(i, entry)| match entry.split_once('=') {
            Some((name, key)) => Account::from_private_key(name.trim(), key),
            None => Account::from_private_key(format!("Account {}", i + 1), entry),
        })
        .collect()
}

#[async_trait]
impl KeySource for EnvKeySource {
    async fn enable(&self, app_name: &str) -> WalletResult<Vec<Account>> {
        let raw = std::env::var(&self.var).map_err(|_| {
            WalletError::NoSource(format!("Environment variable {} not set", self.var))
        })?;

        let accounts = parse_key_list(&raw)?;
        tracing::info!(
            app = %app_name,
            source = %self.var,
            accounts = accounts.len(),
            "Key source enabled"
        );
        Ok(accounts)
    }
}

/// In-memory key source.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    accounts: Vec<Account>,
    deny: bool,
}

impl StaticKeySource {
    /// A source that grants access to `accounts`.
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts,
            deny: false,
        }
    }

    /// A source that refuses every access request.
    pub fn denying() -> Self {
        Self {
            accounts: Vec::new(),
            deny: true,
        }
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn enable(&self, app_name: &str) -> WalletResult<Vec<Account>> {
        if self.deny {
            return Err(WalletError::Denied(format!("{} was not authorised", app_name)));
        }
        Ok(self.accounts.clone())
    }
}
