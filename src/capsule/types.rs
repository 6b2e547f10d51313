//! Capsule records and error definitions.

use alloy::primitives::{Address, U256};
use serde::Serialize;
use thiserror::Error;

use crate::chain::{CapsuleId, ChainError, RawCapsule};

/// A decoded capsule visible to the selected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capsule {
    pub id: CapsuleId,
    pub creator: Address,
    pub recipient: Address,
    pub message: String,
    pub unlock_block: u64,
    /// Locked value in the smallest denomination.
    pub value_locked: U256,
}

impl Capsule {
    /// Decode the record stored at `id`.
    pub fn from_raw(id: CapsuleId, raw: RawCapsule) -> CapsuleResult<Self> {
        let message = decode_message(&raw.message)?;
        Ok(Self {
            id,
            creator: raw.creator,
            recipient: raw.recipient,
            message,
            unlock_block: raw.unlock_block,
            value_locked: raw.value_locked,
        })
    }

    /// Whether `address` created or receives this capsule.
    pub fn involves(&self, address: Address) -> bool {
        self.creator == address || self.recipient == address
    }

    /// Unlock threshold is inclusive.
    pub fn is_unlockable(&self, current_block: u64) -> bool {
        current_block >= self.unlock_block
    }

    /// Blocks left until the capsule can be opened.
    pub fn blocks_remaining(&self, current_block: u64) -> u64 {
        self.unlock_block.saturating_sub(current_block)
    }
}

/// Decode a `0x`-prefixed hex message into text.
///
/// Invalid hex is an error. Invalid UTF-8 is replaced, not rejected.
pub fn decode_message(encoded: &str) -> CapsuleResult<String> {
    let digits = encoded.strip_prefix("0x").unwrap_or(encoded);
    let bytes = alloy::hex::decode(digits)
        .map_err(|e| CapsuleError::Decode(format!("'{}': {}", encoded, e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Unlock height a capsule created now would get, `None` on overflow.
pub fn projected_unlock_block(current_block: u64, duration_blocks: u32) -> Option<u64> {
    current_block.checked_add(u64::from(duration_blocks))
}

/// One invalid form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why an open action was refused before anything was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenRejection {
    #[error("chain not connected")]
    NotConnected,
    #[error("no account selected")]
    NoAccount,
    #[error("selected account is not the designated recipient")]
    NotRecipient,
    #[error("capsule is still locked for {blocks_remaining} more blocks")]
    StillLocked { blocks_remaining: u64 },
    #[error("capsule was already opened")]
    AlreadyRevealed,
}

/// Errors surfaced by capsule operations.
#[derive(Debug, Error)]
pub enum CapsuleError {
    /// Form input failed validation; nothing was submitted.
    #[error("Invalid capsule input: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    /// Message bytes could not be decoded.
    #[error("Message decode failed: {0}")]
    Decode(String),

    /// Open preconditions not met; nothing was submitted.
    #[error("Open rejected: {0}")]
    Rejected(OpenRejection),

    /// The chain layer failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A submitted transaction did not finalize.
    #[error("{0}")]
    Transaction(String),

    /// Connection or account missing.
    #[error("Not ready: {0}")]
    NotReady(&'static str),

    /// The same action is still running.
    #[error("An action is already in progress")]
    Busy,
}

/// Result type for capsule operations.
pub type CapsuleResult<T> = Result<T, CapsuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(message: &str) -> RawCapsule {
        RawCapsule {
            creator: Address::repeat_byte(1),
            recipient: Address::repeat_byte(2),
            message: message.to_string(),
            unlock_block: 600,
            value_locked: U256::from(10u64),
        }
    }

    #[test]
    fn test_decode_message() {
        assert_eq!(decode_message("0x68656c6c6f").unwrap(), "hello");
        assert_eq!(decode_message("68656c6c6f").unwrap(), "hello");
        assert_eq!(decode_message("0x").unwrap(), "");
    }

    #[test]
    fn test_decode_rejects_bad_hex() {
        assert!(matches!(decode_message("0xzz"), Err(CapsuleError::Decode(_))));
        assert!(matches!(decode_message("0x123"), Err(CapsuleError::Decode(_))));
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        assert_eq!(decode_message("0x68ff69").unwrap(), "h\u{fffd}i");
    }

    #[test]
    fn test_from_raw() {
        let capsule = Capsule::from_raw(3, raw("0x6869")).unwrap();
        assert_eq!(capsule.id, 3);
        assert_eq!(capsule.message, "hi");
        assert!(capsule.involves(Address::repeat_byte(1)));
        assert!(capsule.involves(Address::repeat_byte(2)));
        assert!(!capsule.involves(Address::repeat_byte(3)));
    }

    #[test]
    fn test_unlock_threshold_is_inclusive() {
        let capsule = Capsule::from_raw(0, raw("0x")).unwrap();
        assert!(!capsule.is_unlockable(599));
        assert!(capsule.is_unlockable(600));
        assert!(capsule.is_unlockable(601));
        assert_eq!(capsule.blocks_remaining(590), 10);
        assert_eq!(capsule.blocks_remaining(700), 0);
    }

    #[test]
    fn test_projected_unlock_block() {
        assert_eq!(projected_unlock_block(500, 100), Some(600));
        assert_eq!(projected_unlock_block(u64::MAX, 1), None);
    }

    #[test]
    fn test_validation_error_display() {
        let err = CapsuleError::Validation(vec![
            FieldError {
                field: "recipient",
                message: "Recipient is required.".into(),
            },
            FieldError {
                field: "duration",
                message: "A positive duration is required.".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid capsule input: recipient: Recipient is required., duration: A positive duration is required."
        );
    }
}
