//! Chain-specific types and error definitions.

use alloy::primitives::{TxHash, B256};
use thiserror::Error;

pub use crate::config::schema::ChainConfig;

/// Sequential capsule identifier assigned by the contract.
pub type CapsuleId = u64;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Transaction was not finalized within the configured time.
    #[error("Transaction not finalized within {0} seconds")]
    ConfirmationTimeout(u64),

    /// Transaction was reverted on-chain.
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// The node rejected or failed to accept the signed transaction.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Contract return data did not match the interface description.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Connection or contract handle not ready.
    #[error("Chain not available: {0}")]
    NotAvailable(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Progress of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Accepted by the node, waiting for a block.
    Submitted { tx_hash: TxHash },
    /// Included in a block that is not final yet.
    InBlock { block_hash: B256, block_number: u64 },
    /// Final. `created` carries the id from a `CapsuleCreated` event, if any.
    Finalized {
        block_number: u64,
        created: Option<CapsuleId>,
    },
    /// Reverted, dropped or timed out.
    Failed(String),
}

impl TxStatus {
    /// Whether no further status will follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Finalized { .. } | TxStatus::Failed(_))
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            TxStatus::Submitted { .. } => "submitted",
            TxStatus::InBlock { .. } => "in_block",
            TxStatus::Finalized { .. } => "finalized",
            TxStatus::Failed(_) => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(1u64);
        assert_eq!(chain_id.0, 1);
        assert_eq!(u64::from(chain_id), 1);
    }

    #[test]
    fn test_error_display() {
        let err = ChainError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = ChainError::GasPriceTooHigh {
            current_gwei: 600,
            max_gwei: 500,
        };
        assert!(err.to_string().contains("600"));
    }

    #[test]
    fn test_reverted_becomes_failed_status() {
        let err = ChainError::Reverted("0xabc in block 12".to_string());
        let status = TxStatus::Failed(err.to_string());
        assert_eq!(status, TxStatus::Failed("Transaction reverted: 0xabc in block 12".into()));
        assert!(status.is_terminal());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TxStatus::InBlock {
            block_hash: B256::ZERO,
            block_number: 7
        }
        .is_terminal());
        assert!(TxStatus::Finalized {
            block_number: 9,
            created: None
        }
        .is_terminal());
        assert!(TxStatus::Failed("reverted".into()).is_terminal());
    }
}
