//! Bindings for the deployed time capsule contract.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::time::Duration;

use crate::chain::backend::{CapsuleContract, RawCapsule, TxProgress};
use crate::chain::client::ChainClient;
use crate::chain::transaction::{CreatedIdDecoder, TxSubmitter};
use crate::chain::types::{CapsuleId, ChainError, ChainResult};
use crate::wallet::Account;

sol! {
    /// Storage layout of one capsule.
    #[derive(Debug)]
    struct CapsuleRecord {
        address creator;
        address recipient;
        bytes message;
        uint64 unlockBlock;
        uint256 valueLocked;
    }

    interface IChronoCapsule {
        function getTotalCapsules() external view returns (uint64);
        function getCapsule(uint64 id) external view returns (bool exists, CapsuleRecord capsule);
        function createCapsule(address recipient, bytes message, uint32 unlockDurationInBlocks) external payable;
        function openCapsule(uint64 id) external;

        /// Emitted when a new capsule is stored.
        event CapsuleCreated(uint64 indexed id, address indexed from, address indexed to, uint64 unlockBlock);

        /// Emitted when the recipient opens a capsule.
        event CapsuleOpened(uint64 indexed id, address indexed by);
    }
}

impl From<CapsuleRecord> for RawCapsule {
    fn from(record: CapsuleRecord) -> Self {
        Self {
            creator: record.creator,
            recipient: record.recipient,
            message: alloy::hex::encode_prefixed(&record.message),
            unlock_block: record.unlockBlock,
            value_locked: record.valueLocked,
        }
    }
}

/// Id of the capsule announced by a `CapsuleCreated` log in `receipt`.
pub fn created_capsule_id(receipt: &TransactionReceipt) -> Option<CapsuleId> {
    receipt
        .inner
        .logs()
        .iter()
        .find_map(|log| log.log_decode::<IChronoCapsule::CapsuleCreated>().ok())
        .map(|decoded| decoded.inner.id)
}

fn no_created_id(_: &TransactionReceipt) -> Option<CapsuleId> {
    None
}

/// Contract handle over a JSON-RPC node.
#[derive(Clone, Debug)]
pub struct AlloyCapsuleContract {
    client: ChainClient,
    address: Address,
    submitter: TxSubmitter,
}

impl AlloyCapsuleContract {
    /// Derive the handle from a connected client and the configured address.
    pub fn new(client: ChainClient) -> ChainResult<Self> {
        let config = client.config();
        let address: Address = config.contract_address.parse().map_err(|e| {
            ChainError::NotAvailable(format!(
                "Invalid contract address '{}': {}",
                config.contract_address, e
            ))
        })?;
        if address == Address::ZERO {
            tracing::warn!("Contract address is the zero address; queries will return nothing useful");
        }

        let poll_interval = Duration::from_millis(config.block_poll_interval_ms);
        let submitter = TxSubmitter::new(client.clone(), poll_interval);

        Ok(Self {
            client,
            address,
            submitter,
        })
    }

    /// Deployed contract address.
    pub fn address(&self) -> Address {
        self.address
    }

    async fn read<C>(&self, caller: Address, call: C) -> ChainResult<C::Return>
    where
        C: SolCall + Send + Sync,
        C::Return: Send,
    {
        let tx = TransactionRequest::default()
            .with_from(caller)
            .with_to(self.address)
            .with_input(call.abi_encode());

        let data = self.client.call(tx).await?;
        C::abi_decode_returns(&data).map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn send(
        &self,
        signer: &Account,
        value: U256,
        data: Vec<u8>,
        decode_created: CreatedIdDecoder,
    ) -> ChainResult<TxProgress> {
        let tx = self
            .submitter
            .build(signer.address(), self.address, value, Bytes::from(data))
            .await?;
        let tx_hash = self.submitter.submit(signer, tx).await?;
        Ok(self.submitter.track(tx_hash, decode_created))
    }
}

#[async_trait]
impl CapsuleContract for AlloyCapsuleContract {
    async fn total_capsules(&self, caller: Address) -> ChainResult<u64> {
        self.read(caller, IChronoCapsule::getTotalCapsulesCall {}).await
    }

    async fn capsule(&self, caller: Address, id: CapsuleId) -> ChainResult<Option<RawCapsule>> {
        let ret = self.read(caller, IChronoCapsule::getCapsuleCall { id }).await?;
        Ok(ret.exists.then(|| RawCapsule::from(ret.capsule)))
    }

    async fn create_capsule(
        &self,
        signer: &Account,
        value: U256,
        recipient: Address,
        message: Bytes,
        duration_blocks: u32,
    ) -> ChainResult<TxProgress> {
        let call = IChronoCapsule::createCapsuleCall {
            recipient,
            message,
            unlockDurationInBlocks: duration_blocks,
        };
        self.send(signer, value, call.abi_encode(), created_capsule_id).await
    }

    async fn open_capsule(&self, signer: &Account, id: CapsuleId) -> ChainResult<TxProgress> {
        let call = IChronoCapsule::openCapsuleCall { id };
        self.send(signer, U256::ZERO, call.abi_encode(), no_created_id).await
    }
}
