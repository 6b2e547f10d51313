//! JSON-RPC client over an ordered list of endpoints.
//!
//! Every query is tried against the primary endpoint first, then each
//! failover in turn, with a per-call timeout. The first answer wins.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use async_trait::async_trait;
use tokio::time::timeout;

use crate::chain::backend::ChainReader;
use crate::chain::types::{ChainConfig, ChainError, ChainId, ChainResult};

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// Read access to the chain with endpoint failover.
#[derive(Clone)]
pub struct ChainClient {
    endpoints: Vec<DynProvider>,
    config: ChainConfig,
    call_timeout: Duration,
}

impl ChainClient {
    /// Build providers for the configured endpoints and check the chain id.
    ///
    /// Only an unparseable primary URL is fatal. An unreachable node or a
    /// wrong chain id is logged and the client is still returned.
    pub async fn new(config: ChainConfig) -> ChainResult<Self> {
        let primary: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        let mut endpoints: Vec<DynProvider> = vec![Arc::new(ProviderBuilder::new().connect_http(primary))];

        for raw in &config.failover_urls {
            match raw.parse::<url::Url>() {
                Ok(url) => endpoints.push(Arc::new(ProviderBuilder::new().connect_http(url))),
                Err(_) => tracing::warn!(url = %raw, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            endpoints,
            call_timeout: Duration::from_secs(config.rpc_timeout_secs),
            config,
        };

        if let Err(e) = client.verify_chain_id().await {
            tracing::warn!(error = %e, rpc_url = %client.config.rpc_url, "Chain id not verified");
        } else {
            tracing::info!(
                rpc_url = %client.config.rpc_url,
                chain_id = client.config.chain_id,
                endpoints = client.endpoints.len(),
                "Chain client ready"
            );
        }

        Ok(client)
    }

    /// Run `query` against each endpoint until one answers in time.
    async fn with_failover<T, E, F, Fut>(&self, op: &'static str, query: F) -> ChainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        for (endpoint, provider) in self.endpoints.iter().enumerate() {
            match timeout(self.call_timeout, query(Arc::clone(provider))).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => tracing::warn!(op, endpoint, error = %e, "RPC error"),
                Err(_) => tracing::warn!(op, endpoint, "RPC timeout"),
            }
        }
        Err(ChainError::Rpc(format!("All RPC providers failed ({})", op)))
    }

    /// Fail with `ChainMismatch` unless the node serves the configured chain.
    pub async fn verify_chain_id(&self) -> ChainResult<()> {
        let actual = self.get_chain_id().await?;
        if actual.0 != self.config.chain_id {
            return Err(ChainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: actual.0,
            });
        }
        Ok(())
    }

    pub async fn get_chain_id(&self) -> ChainResult<ChainId> {
        self.with_failover("chain_id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    pub async fn get_block_number(&self) -> ChainResult<u64> {
        self.with_failover("block_number", |p| async move { p.get_block_number().await })
            .await
    }

    pub async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        self.with_failover("balance", move |p| async move { p.get_balance(address).await })
            .await
    }

    /// Next nonce for `address`.
    pub async fn get_transaction_count(&self, address: Address) -> ChainResult<u64> {
        self.with_failover("nonce", move |p| async move {
            p.get_transaction_count(address).await
        })
        .await
    }

    /// `None` while the transaction is still pending.
    pub async fn get_transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> ChainResult<Option<TransactionReceipt>> {
        self.with_failover("receipt", move |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    /// Gas price in wei.
    pub async fn get_gas_price(&self) -> ChainResult<u128> {
        self.with_failover("gas_price", |p| async move { p.get_gas_price().await })
            .await
    }

    /// Execute a read-only call and return the raw return data.
    pub async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes> {
        self.with_failover("call", |p| {
            let tx = tx.clone();
            async move { p.call(tx).await }
        })
        .await
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Blocks a receipt must be buried under before it counts as final.
    pub fn confirmation_blocks(&self) -> u32 {
        self.config.confirmation_blocks
    }
}

#[async_trait]
impl ChainReader for ChainClient {
    async fn block_number(&self) -> ChainResult<u64> {
        self.get_block_number().await
    }

    async fn balance(&self, address: Address) -> ChainResult<U256> {
        self.get_balance(address).await
    }

    fn decimals(&self) -> u8 {
        self.config.decimals
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}
