//! Account discovery, selection and balance subscription.
//!
//! # Responsibilities
//! - Ask the key source for access and remember the granted accounts
//! - Track the selected account (defaults to the first one granted)
//! - Keep exactly one balance subscription alive, keyed to the selection

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy::primitives::{Address, U256};
use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chain::ChainHandle;
use crate::observability::metrics;
use crate::wallet::account::Account;
use crate::wallet::source::KeySource;
use crate::wallet::types::{WalletError, WalletResult};

/// Tracks granted accounts and the active one.
pub struct AccountSelector {
    source: Arc<dyn KeySource>,
    app_name: String,
    accounts: ArcSwap<Vec<Account>>,
    selected: watch::Sender<Option<Account>>,
    balance: Arc<watch::Sender<Option<U256>>>,
    balance_task: Mutex<Option<JoinHandle<()>>>,
    chain: watch::Receiver<Option<ChainHandle>>,
    poll_interval: Duration,
}

impl AccountSelector {
    /// Create a selector with no accounts.
    ///
    /// `chain` is the connection's handle channel; balance polling starts
    /// once it carries a handle.
    pub fn new(
        source: Arc<dyn KeySource>,
        app_name: impl Into<String>,
        chain: watch::Receiver<Option<ChainHandle>>,
        poll_interval: Duration,
    ) -> Self {
        let (selected, _) = watch::channel(None);
        let (balance, _) = watch::channel(None);
        Self {
            source,
            app_name: app_name.into(),
            accounts: ArcSwap::from_pointee(Vec::new()),
            selected,
            balance: Arc::new(balance),
            balance_task: Mutex::new(None),
            chain,
            poll_interval,
        }
    }

    /// Request access from the key source.
    ///
    /// On success the first account becomes the selection. On denial or
    /// absence the account list is emptied and the error is returned.
    pub async fn connect(&self) -> WalletResult<Arc<Vec<Account>>> {
        match self.source.enable(&self.app_name).await {
            Ok(accounts) if accounts.is_empty() => {
                tracing::warn!("Key source granted access but returned no accounts");
                self.clear();
                Err(WalletError::NoAccounts)
            }
            Ok(accounts) => {
                let first = accounts[0].clone();
                self.accounts.store(Arc::new(accounts));
                tracing::info!(count = self.accounts.load().len(), "Accounts discovered");
                self.activate(first);
                Ok(self.accounts.load_full())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error connecting to key source");
                self.clear();
                Err(e)
            }
        }
    }

    /// Switch the active account. It must be one of the discovered accounts.
    pub fn select_account(&self, address: Address) -> WalletResult<()> {
        let account = self
            .accounts
            .load()
            .iter()
            .find(|a| a.address() == address)
            .cloned()
            .ok_or(WalletError::UnknownAccount(address))?;

        if self.selected_address() == Some(address) {
            return Ok(());
        }
        self.activate(account);
        Ok(())
    }

    /// Forget all accounts and stop the balance subscription.
    pub fn disconnect(&self) {
        self.clear();
    }

    /// Discovered accounts.
    pub fn accounts(&self) -> Arc<Vec<Account>> {
        self.accounts.load_full()
    }

    /// The active account, if any.
    pub fn selected(&self) -> Option<Account> {
        self.selected.borrow().clone()
    }

    /// Address of the active account, if any.
    pub fn selected_address(&self) -> Option<Address> {
        self.selected.borrow().as_ref().map(Account::address)
    }

    /// Watch selection changes.
    pub fn subscribe_selected(&self) -> watch::Receiver<Option<Account>> {
        self.selected.subscribe()
    }

    /// Last known balance of the active account.
    pub fn balance(&self) -> Option<U256> {
        *self.balance.borrow()
    }

    /// Watch balance updates of the active account.
    pub fn subscribe_balance(&self) -> watch::Receiver<Option<U256>> {
        self.balance.subscribe()
    }

    /// Whether a balance subscription task is currently alive.
    pub fn has_balance_subscription(&self) -> bool {
        self.balance_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn activate(&self, account: Account) {
        let mut task = self.balance_task.lock().unwrap_or_else(PoisonError::into_inner);
        // The old subscription goes first so no stale update can land after the switch.
        if let Some(previous) = task.take() {
            previous.abort();
        }
        self.balance.send_replace(None);

        let address = account.address();
        tracing::info!(account = %account.label(), "Account selected");
        self.selected.send_replace(Some(account));

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                *task = Some(runtime.spawn(follow_balance(
                    address,
                    self.chain.clone(),
                    Arc::clone(&self.balance),
                    self.poll_interval,
                )));
            }
            Err(_) => tracing::warn!("No runtime available, balance subscription not started"),
        }
    }

    fn clear(&self) {
        let mut task = self.balance_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = task.take() {
            previous.abort();
        }
        self.accounts.store(Arc::new(Vec::new()));
        self.selected.send_replace(None);
        self.balance.send_replace(None);
    }
}

impl Drop for AccountSelector {
    fn drop(&mut self) {
        let task = self
            .balance_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl std::fmt::Debug for AccountSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSelector")
            .field("app_name", &self.app_name)
            .field("accounts", &self.accounts.load().len())
            .field("selected", &self.selected_address())
            .finish()
    }
}

async fn follow_balance(
    address: Address,
    mut chain: watch::Receiver<Option<ChainHandle>>,
    balance: Arc<watch::Sender<Option<U256>>>,
    interval: Duration,
) {
    let reader = match chain.wait_for(Option::is_some).await {
        Ok(handle) => handle.as_ref().map(|h| Arc::clone(&h.reader)),
        Err(_) => None,
    };
    let Some(reader) = reader else {
        tracing::debug!(%address, "Connection closed before balance subscription started");
        return;
    };

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let polled = reader.balance(address).await;
        metrics::record_query("balance", polled.is_ok());
        match polled {
            Ok(value) => {
                balance.send_replace(Some(value));
            }
            Err(e) => tracing::warn!(%address, error = %e, "Balance query failed"),
        }
    }
}
