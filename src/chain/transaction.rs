//! Transaction building, submission and finality tracking.
//!
//! # Responsibilities
//! - Build transactions with nonce sync and a gas price ceiling
//! - Sign with the selected account and broadcast
//! - Follow the receipt and stream `InBlock` then `Finalized` (or `Failed`)

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::chain::backend::TxProgress;
use crate::chain::client::ChainClient;
use crate::chain::types::{CapsuleId, ChainError, ChainResult, TxStatus};
use crate::wallet::Account;

/// Extracts the id of a created capsule from a receipt, if the receipt has one.
pub type CreatedIdDecoder = fn(&TransactionReceipt) -> Option<CapsuleId>;

/// Builds, signs and tracks contract transactions.
#[derive(Clone, Debug)]
pub struct TxSubmitter {
    client: ChainClient,
    poll_interval: Duration,
}

impl TxSubmitter {
    /// Create a new submitter polling receipts every `poll_interval`.
    pub fn new(client: ChainClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Build a transaction request.
    ///
    /// # Arguments
    /// * `from` - Signing account address
    /// * `to` - Contract address
    /// * `value` - Native value attached to the call
    /// * `data` - ABI-encoded call data
    pub async fn build(
        &self,
        from: Address,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> ChainResult<TransactionRequest> {
        let nonce = self.client.get_transaction_count(from).await?;

        let gas_price = self.client.get_gas_price().await?;
        let gas_price_gwei = gas_price / 1_000_000_000;

        let config = self.client.config();
        if gas_price_gwei > config.max_gas_price_gwei as u128 {
            return Err(ChainError::GasPriceTooHigh {
                current_gwei: gas_price_gwei as u64,
                max_gwei: config.max_gas_price_gwei,
            });
        }

        let adjusted_gas_price = (gas_price as f64 * config.gas_price_multiplier) as u128;

        // Gas limit is left to the provider's estimator.
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(value)
            .with_input(data)
            .with_nonce(nonce)
            .with_gas_price(adjusted_gas_price)
            .with_chain_id(config.chain_id);

        Ok(tx)
    }

    /// Sign `tx` with `account` and broadcast it.
    pub async fn submit(&self, account: &Account, tx: TransactionRequest) -> ChainResult<TxHash> {
        let config = self.client.config();
        let url: url::Url = config.rpc_url.parse().map_err(|e| {
            ChainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(account.signer().clone()))
            .connect_http(url);

        let pending = timeout(
            Duration::from_secs(config.rpc_timeout_secs),
            provider.send_transaction(tx),
        )
        .await
        .map_err(|_| ChainError::Timeout(config.rpc_timeout_secs))?
        .map_err(|e| ChainError::Submission(e.to_string()))?;

        let tx_hash = *pending.tx_hash();
        tracing::info!(tx_hash = %tx_hash, from = %account.address(), "Transaction broadcast");
        Ok(tx_hash)
    }

    /// Follow `tx_hash` in the background and stream its progress.
    pub fn track(&self, tx_hash: TxHash, decode_created: CreatedIdDecoder) -> TxProgress {
        let (sender, progress) = TxProgress::channel();
        let submitter = self.clone();
        let timeout_secs = self.client.config().tx_timeout_secs;

        tokio::spawn(async move {
            let _ = sender.send(TxStatus::Submitted { tx_hash }).await;
            let status = match submitter
                .wait_for_finality(tx_hash, timeout_secs, decode_created, &sender)
                .await
            {
                Ok(status) => status,
                Err(e) => TxStatus::Failed(e.to_string()),
            };
            tracing::info!(tx_hash = %tx_hash, status = status.label(), "Transaction settled");
            // A dropped receiver means nobody is waiting for the outcome any more.
            let _ = sender.send(status).await;
        });

        progress
    }

    /// Wait for a transaction to reach the configured confirmation depth.
    async fn wait_for_finality(
        &self,
        tx_hash: TxHash,
        timeout_secs: u64,
        decode_created: CreatedIdDecoder,
        updates: &mpsc::Sender<TxStatus>,
    ) -> ChainResult<TxStatus> {
        let required_confirmations = self.client.confirmation_blocks() as u64;

        let result = timeout(Duration::from_secs(timeout_secs), async {
            let mut ticker = interval(self.poll_interval);
            let mut included_at: Option<u64> = None;

            loop {
                ticker.tick().await;

                let receipt = match self.client.get_transaction_receipt(tx_hash).await? {
                    Some(r) => r,
                    None => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                        continue;
                    }
                };

                if !receipt.status() {
                    return Err(ChainError::Reverted(format!(
                        "{} in block {}",
                        tx_hash,
                        receipt.block_number.unwrap_or_default()
                    )));
                }

                let current_block = self.client.get_block_number().await?;
                let tx_block = receipt.block_number.unwrap_or(current_block);

                if included_at != Some(tx_block) {
                    included_at = Some(tx_block);
                    let _ = updates
                        .send(TxStatus::InBlock {
                            block_hash: receipt.block_hash.unwrap_or_default(),
                            block_number: tx_block,
                        })
                        .await;
                }

                let confirmations = current_block.saturating_sub(tx_block);
                if confirmations >= required_confirmations {
                    return Ok(TxStatus::Finalized {
                        block_number: tx_block,
                        created: decode_created(&receipt),
                    });
                }

                tracing::debug!(
                    tx_hash = %tx_hash,
                    confirmations = confirmations,
                    required = required_confirmations,
                    "Waiting for finality"
                );
            }
        })
        .await;

        match result {
            Ok(status) => status,
            Err(_) => Err(ChainError::ConfirmationTimeout(timeout_secs)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::ChainConfig;

    #[tokio::test]
    async fn test_build_fails_without_node() {
        let config = ChainConfig {
            rpc_timeout_secs: 2,
            ..Default::default()
        };
        let client = ChainClient::new(config).await.unwrap();
        let submitter = TxSubmitter::new(client, Duration::from_millis(100));

        let result = submitter
            .build(Address::ZERO, Address::ZERO, U256::ZERO, Bytes::new())
            .await;
        assert!(matches!(result, Err(ChainError::Rpc(_))));
    }
}
