//! Shared utilities for integration tests: an in-memory chain and contract.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

use chrono_capsule::chain::{
    CapsuleContract, CapsuleId, ChainError, ChainHandle, ChainReader, ChainResult, RawCapsule,
    TxProgress, TxStatus,
};
use chrono_capsule::config::CapsuleConfig;
use chrono_capsule::context::AppContext;
use chrono_capsule::wallet::{Account, StaticKeySource};

pub const ALICE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const BOB_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
pub const CAROL_KEY: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

pub fn alice() -> Account {
    Account::from_private_key("alice", ALICE_KEY).unwrap()
}

pub fn bob() -> Account {
    Account::from_private_key("bob", BOB_KEY).unwrap()
}

pub fn carol() -> Account {
    Account::from_private_key("carol", CAROL_KEY).unwrap()
}

/// Short poll intervals and display delays.
pub fn test_config() -> CapsuleConfig {
    let mut config = CapsuleConfig::default();
    config.chain.block_poll_interval_ms = 10;
    config.wallet.balance_poll_interval_ms = 10;
    config.timing.status_display_ms = 50;
    config
}

/// Chain state plus the capsule contract, all in memory.
#[derive(Default)]
pub struct MockChain {
    block: AtomicU64,
    capsules: Mutex<Vec<Option<RawCapsule>>>,
    balances: Mutex<HashMap<Address, U256>>,
    balance_queries: Mutex<Vec<Address>>,
    failing: Mutex<HashSet<CapsuleId>>,
    fail_total: AtomicBool,
    revert: AtomicBool,
    capsule_delay: Mutex<Option<Duration>>,
    opened: Mutex<Vec<CapsuleId>>,
    capsule_queries: AtomicUsize,
    block_delay: Mutex<Option<Duration>>,
    tx_delay: Mutex<Option<Duration>>,
}

impl MockChain {
    pub fn new(block: u64) -> Arc<Self> {
        let chain = Self::default();
        chain.block.store(block, Ordering::SeqCst);
        Arc::new(chain)
    }

    pub fn handle(self: &Arc<Self>) -> ChainHandle {
        ChainHandle::new(self.clone(), self.clone())
    }

    pub fn set_block(&self, height: u64) {
        self.block.store(height, Ordering::SeqCst);
    }

    pub fn block(&self) -> u64 {
        self.block.load(Ordering::SeqCst)
    }

    pub fn insert(&self, raw: RawCapsule) -> CapsuleId {
        let mut capsules = self.capsules.lock().unwrap();
        capsules.push(Some(raw));
        (capsules.len() - 1) as CapsuleId
    }

    pub fn insert_capsule(
        &self,
        creator: Address,
        recipient: Address,
        message: &str,
        unlock_block: u64,
    ) -> CapsuleId {
        self.insert(RawCapsule {
            creator,
            recipient,
            message: alloy::hex::encode_prefixed(message.as_bytes()),
            unlock_block,
            value_locked: U256::ZERO,
        })
    }

    pub fn insert_empty_slot(&self) -> CapsuleId {
        let mut capsules = self.capsules.lock().unwrap();
        capsules.push(None);
        (capsules.len() - 1) as CapsuleId
    }

    pub fn fail_index(&self, id: CapsuleId) {
        self.failing.lock().unwrap().insert(id);
    }

    pub fn fail_total(&self, fail: bool) {
        self.fail_total.store(fail, Ordering::SeqCst);
    }

    pub fn revert_transactions(&self, revert: bool) {
        self.revert.store(revert, Ordering::SeqCst);
    }

    pub fn set_capsule_delay(&self, delay: Option<Duration>) {
        *self.capsule_delay.lock().unwrap() = delay;
    }

    /// Delay every block height query by `delay`.
    pub fn set_block_delay(&self, delay: Option<Duration>) {
        *self.block_delay.lock().unwrap() = delay;
    }

    /// Delay every create and open submission by `delay`.
    pub fn set_tx_delay(&self, delay: Option<Duration>) {
        *self.tx_delay.lock().unwrap() = delay;
    }

    async fn pause(slot: &Mutex<Option<Duration>>) {
        let delay = *slot.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn set_balance(&self, address: Address, value: U256) {
        self.balances.lock().unwrap().insert(address, value);
    }

    pub fn balance_queries(&self) -> Vec<Address> {
        self.balance_queries.lock().unwrap().clone()
    }

    pub fn clear_balance_queries(&self) {
        self.balance_queries.lock().unwrap().clear();
    }

    /// Number of per-index capsule queries served.
    pub fn capsule_queries(&self) -> usize {
        self.capsule_queries.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<CapsuleId> {
        self.opened.lock().unwrap().clone()
    }

    pub fn stored(&self, id: CapsuleId) -> Option<RawCapsule> {
        self.capsules.lock().unwrap().get(id as usize).cloned().flatten()
    }

    fn settle(&self, created: Option<CapsuleId>) -> TxProgress {
        let (tx, progress) = TxProgress::channel();
        let block_number = self.block();
        if self.revert.load(Ordering::SeqCst) {
            let _ = tx.try_send(TxStatus::Failed("Transaction reverted".to_string()));
            return progress;
        }
        let _ = tx.try_send(TxStatus::Submitted {
            tx_hash: B256::repeat_byte(0x42),
        });
        let _ = tx.try_send(TxStatus::InBlock {
            block_hash: B256::repeat_byte(0x07),
            block_number,
        });
        let _ = tx.try_send(TxStatus::Finalized {
            block_number,
            created,
        });
        progress
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn block_number(&self) -> ChainResult<u64> {
        Self::pause(&self.block_delay).await;
        Ok(self.block())
    }

    async fn balance(&self, address: Address) -> ChainResult<U256> {
        self.balance_queries.lock().unwrap().push(address);
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    fn decimals(&self) -> u8 {
        18
    }
}

#[async_trait]
impl CapsuleContract for MockChain {
    async fn total_capsules(&self, _caller: Address) -> ChainResult<u64> {
        if self.fail_total.load(Ordering::SeqCst) {
            return Err(ChainError::Rpc("node unavailable".to_string()));
        }
        Ok(self.capsules.lock().unwrap().len() as u64)
    }

    async fn capsule(&self, _caller: Address, id: CapsuleId) -> ChainResult<Option<RawCapsule>> {
        self.capsule_queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.capsule_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(&id) {
            return Err(ChainError::Rpc(format!("capsule {} unavailable", id)));
        }
        Ok(self.stored(id))
    }

    async fn create_capsule(
        &self,
        signer: &Account,
        value: U256,
        recipient: Address,
        message: Bytes,
        duration_blocks: u32,
    ) -> ChainResult<TxProgress> {
        Self::pause(&self.tx_delay).await;
        if self.revert.load(Ordering::SeqCst) {
            return Ok(self.settle(None));
        }
        let id = self.insert(RawCapsule {
            creator: signer.address(),
            recipient,
            message: alloy::hex::encode_prefixed(&message),
            unlock_block: self.block() + u64::from(duration_blocks),
            value_locked: value,
        });
        Ok(self.settle(Some(id)))
    }

    async fn open_capsule(&self, _signer: &Account, id: CapsuleId) -> ChainResult<TxProgress> {
        Self::pause(&self.tx_delay).await;
        if !self.revert.load(Ordering::SeqCst) {
            self.opened.lock().unwrap().push(id);
        }
        Ok(self.settle(None))
    }
}

/// Context over `chain` with the given accounts granted and connected.
pub async fn connected_context(chain: &Arc<MockChain>, accounts: Vec<Account>) -> Arc<AppContext> {
    let ctx = AppContext::with_handle(
        test_config(),
        chain.handle(),
        Arc::new(StaticKeySource::new(accounts)),
    );
    ctx.accounts().connect().await.unwrap();
    ctx.connection()
        .wait_for_block(chain.block(), Duration::from_secs(2))
        .await
        .unwrap();
    Arc::new(ctx)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
