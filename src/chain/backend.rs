//! Seams between the capsule logic and the chain.
//!
//! `ChainReader` and `CapsuleContract` are what the rest of the crate talks
//! to. The alloy-backed implementations live in `client.rs` and
//! `contract.rs`; tests substitute in-memory ones.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::chain::types::{CapsuleId, ChainResult, TxStatus};
use crate::wallet::Account;

/// A capsule as the contract query returns it, before client-side decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCapsule {
    pub creator: Address,
    pub recipient: Address,
    /// Message bytes, `0x`-prefixed hex.
    pub message: String,
    pub unlock_block: u64,
    pub value_locked: U256,
}

/// Read access to chain state that is not contract specific.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Latest block height.
    async fn block_number(&self) -> ChainResult<u64>;

    /// Native balance of an address, in the smallest denomination.
    async fn balance(&self, address: Address) -> ChainResult<U256>;

    /// Decimal precision of the native token.
    fn decimals(&self) -> u8;
}

/// The deployed time capsule contract.
#[async_trait]
pub trait CapsuleContract: Send + Sync {
    /// Number of capsules ever created; ids run `0..total`.
    async fn total_capsules(&self, caller: Address) -> ChainResult<u64>;

    /// Capsule at `id`, or `None` when the slot is empty.
    async fn capsule(&self, caller: Address, id: CapsuleId) -> ChainResult<Option<RawCapsule>>;

    /// Submit `createCapsule`, paying `value` into the capsule.
    async fn create_capsule(
        &self,
        signer: &Account,
        value: U256,
        recipient: Address,
        message: Bytes,
        duration_blocks: u32,
    ) -> ChainResult<TxProgress>;

    /// Submit `openCapsule`.
    async fn open_capsule(&self, signer: &Account, id: CapsuleId) -> ChainResult<TxProgress>;
}

/// Everything a connected client can reach.
#[derive(Clone)]
pub struct ChainHandle {
    pub reader: Arc<dyn ChainReader>,
    pub contract: Arc<dyn CapsuleContract>,
}

impl ChainHandle {
    pub fn new(reader: Arc<dyn ChainReader>, contract: Arc<dyn CapsuleContract>) -> Self {
        Self { reader, contract }
    }
}

impl std::fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHandle")
            .field("decimals", &self.reader.decimals())
            .finish_non_exhaustive()
    }
}

/// Stream of status updates for one submitted transaction.
#[derive(Debug)]
pub struct TxProgress {
    rx: mpsc::Receiver<TxStatus>,
}

impl TxProgress {
    /// Create a progress stream and the sender that feeds it.
    pub fn channel() -> (mpsc::Sender<TxStatus>, Self) {
        let (tx, rx) = mpsc::channel(8);
        (tx, Self { rx })
    }

    /// Next status, or `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<TxStatus> {
        self.rx.recv().await
    }

    /// Drain until a terminal status.
    ///
    /// A producer that disappears early counts as a failure.
    pub async fn finish(mut self) -> TxStatus {
        while let Some(status) = self.next().await {
            if status.is_terminal() {
                return status;
            }
        }
        TxStatus::Failed("status stream closed before finalization".to_string())
    }
}
