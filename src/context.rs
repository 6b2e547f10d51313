//! Shared application state.
//!
//! One `AppContext` owns the chain connection and the account selector.
//! Everything else borrows it. Dropping it tears down the block follower and
//! the balance subscription.

use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainConnection, ChainHandle};
use crate::config::CapsuleConfig;
use crate::wallet::{AccountSelector, KeySource};

/// Connection, accounts and configuration for one session.
#[derive(Debug)]
pub struct AppContext {
    config: CapsuleConfig,
    connection: ChainConnection,
    accounts: AccountSelector,
}

impl AppContext {
    /// Open the configured chain connection in the background.
    ///
    /// Accounts are not requested until `accounts().connect()` is called.
    pub fn start(config: CapsuleConfig, source: Arc<dyn KeySource>) -> Self {
        let connection = ChainConnection::open(config.chain.clone());
        Self::from_parts(config, connection, source)
    }

    /// Build a context over an existing connection.
    pub fn from_parts(
        config: CapsuleConfig,
        connection: ChainConnection,
        source: Arc<dyn KeySource>,
    ) -> Self {
        let accounts = AccountSelector::new(
            source,
            config.wallet.app_name.clone(),
            connection.watch_handle(),
            Duration::from_millis(config.wallet.balance_poll_interval_ms),
        );
        Self {
            config,
            connection,
            accounts,
        }
    }

    /// Context over an already connected handle, following its heads.
    pub fn with_handle(config: CapsuleConfig, handle: ChainHandle, source: Arc<dyn KeySource>) -> Self {
        let poll = Duration::from_millis(config.chain.block_poll_interval_ms);
        Self::from_parts(config, ChainConnection::with_handle(handle, poll), source)
    }

    pub fn config(&self) -> &CapsuleConfig {
        &self.config
    }

    pub fn connection(&self) -> &ChainConnection {
        &self.connection
    }

    pub fn accounts(&self) -> &AccountSelector {
        &self.accounts
    }

    /// Latest published block height.
    pub fn current_block(&self) -> u64 {
        self.connection.current_block()
    }

    /// Token precision from the live handle, else from config.
    pub fn decimals(&self) -> u8 {
        self.connection
            .handle()
            .map(|handle| handle.reader.decimals())
            .unwrap_or(self.config.chain.decimals)
    }

    /// How long action status messages stay up before the follow-up.
    pub fn status_display(&self) -> Duration {
        Duration::from_millis(self.config.timing.status_display_ms)
    }

    /// Stop the block follower and forget the accounts.
    pub fn close(&mut self) {
        self.accounts.disconnect();
        self.connection.close();
    }
}
