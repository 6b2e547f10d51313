//! Capsule creation form.
//!
//! # State Machine
//! ```text
//! Idle ──submit──▶ Submitting ──in block──▶ InBlock ──finalized──▶ Finalized
//!                     │                        │                      │
//!                     └────── failure ─────────┴──▶ Error             └─ delay ─▶ Idle
//! ```
//!
//! The form is disabled while `Submitting` or `InBlock`. `Error` re-enables it.

use std::sync::{Arc, Mutex, PoisonError};

use alloy::primitives::utils::{parse_units, ParseUnits};
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::capsule::query::CapsuleQueryService;
use crate::capsule::types::{projected_unlock_block, CapsuleError, CapsuleResult, FieldError};
use crate::chain::{CapsuleId, TxStatus};
use crate::context::AppContext;
use crate::observability::metrics;

/// Raw form input, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapsuleDraft {
    pub recipient: String,
    pub message: String,
    /// Lock duration in blocks.
    pub duration: String,
    /// Value in whole tokens; empty means zero.
    pub value: String,
}

/// Input that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDraft {
    pub recipient: Address,
    pub message: Bytes,
    pub duration_blocks: u32,
    pub value: U256,
}

/// Check every field and collect all problems at once.
pub fn validate_draft(draft: &CapsuleDraft, decimals: u8) -> Result<ValidatedDraft, Vec<FieldError>> {
    let mut errors = Vec::new();

    let recipient = draft.recipient.trim();
    let recipient = if recipient.is_empty() {
        errors.push(FieldError {
            field: "recipient",
            message: "Recipient is required.".to_string(),
        });
        None
    } else {
        match recipient.parse::<Address>() {
            Ok(address) => Some(address),
            Err(_) => {
                errors.push(FieldError {
                    field: "recipient",
                    message: "Recipient is not a valid address.".to_string(),
                });
                None
            }
        }
    };

    if draft.message.trim().is_empty() {
        errors.push(FieldError {
            field: "message",
            message: "A message is required.".to_string(),
        });
    }

    let duration = match draft.duration.trim().parse::<u32>() {
        Ok(blocks) if blocks > 0 => Some(blocks),
        _ => {
            errors.push(FieldError {
                field: "duration",
                message: "A positive duration is required.".to_string(),
            });
            None
        }
    };

    let value = match parse_value(&draft.value, decimals) {
        Ok(value) => Some(value),
        Err(message) => {
            errors.push(FieldError {
                field: "value",
                message,
            });
            None
        }
    };

    match (recipient, duration, value) {
        (Some(recipient), Some(duration_blocks), Some(value)) if errors.is_empty() => {
            Ok(ValidatedDraft {
                recipient,
                message: Bytes::from(draft.message.clone().into_bytes()),
                duration_blocks,
                value,
            })
        }
        _ => Err(errors),
    }
}

/// Convert a decimal token amount into the smallest denomination.
pub fn parse_value(input: &str, decimals: u8) -> Result<U256, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(U256::ZERO);
    }
    if input.starts_with('-') {
        return Err("Value must not be negative.".to_string());
    }
    if let Some((_, fraction)) = input.split_once('.') {
        if fraction.trim_end_matches('0').len() > usize::from(decimals) {
            return Err(format!("Value has more than {} decimal places.", decimals));
        }
    }
    match parse_units(input, decimals) {
        Ok(ParseUnits::U256(value)) => Ok(value),
        Ok(ParseUnits::I256(_)) => Err("Value must not be negative.".to_string()),
        Err(e) => Err(format!("Value is not a valid amount: {}", e)),
    }
}

/// Where the form is in its submit cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateState {
    Idle,
    Submitting,
    InBlock { block_hash: B256, block_number: u64 },
    Finalized { capsule_id: Option<CapsuleId> },
    Error(String),
}

impl CreateState {
    /// Whether the form accepts a new submission.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, CreateState::Submitting | CreateState::InBlock { .. })
    }
}

/// The creation form and its status line.
pub struct CreateCapsuleForm {
    state: Arc<watch::Sender<CreateState>>,
    status: Arc<watch::Sender<String>>,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl CreateCapsuleForm {
    pub fn new() -> Self {
        let (state, _) = watch::channel(CreateState::Idle);
        let (status, _) = watch::channel(String::new());
        Self {
            state: Arc::new(state),
            status: Arc::new(status),
            reset_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CreateState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CreateState> {
        self.state.subscribe()
    }

    /// Current status line shown under the form.
    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.borrow().is_enabled()
    }

    /// Validate `draft`, submit it and follow the transaction.
    ///
    /// Returns the created capsule id when the finalized receipt carries one.
    /// Missing connection, missing account and invalid input are reported
    /// without leaving `Idle`.
    pub async fn submit(
        &self,
        ctx: &Arc<AppContext>,
        queries: &CapsuleQueryService,
        draft: &CapsuleDraft,
    ) -> CapsuleResult<Option<CapsuleId>> {
        if !self.is_enabled() {
            return Err(CapsuleError::Busy);
        }
        let handle = ctx
            .connection()
            .handle()
            .ok_or(CapsuleError::NotReady("chain not connected"))?;
        let account = ctx
            .accounts()
            .selected()
            .ok_or(CapsuleError::NotReady("no account selected"))?;
        let input = validate_draft(draft, handle.reader.decimals()).map_err(CapsuleError::Validation)?;
        let cached_block = ctx.current_block();
        projected_unlock_block(cached_block, input.duration_blocks).ok_or_else(|| {
            CapsuleError::Validation(vec![FieldError {
                field: "duration",
                message: "Duration overflows the unlock block.".to_string(),
            }])
        })?;

        let claimed = self.state.send_if_modified(|state| {
            if state.is_enabled() {
                *state = CreateState::Submitting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(CapsuleError::Busy);
        }
        self.cancel_reset();
        self.status.send_replace("Preparing transaction...".to_string());

        // The contract counts the duration from the block that includes the call.
        let head = match handle.reader.block_number().await {
            Ok(height) => height.max(cached_block),
            Err(e) => {
                tracing::debug!(error = %e, "Using cached block height for unlock projection");
                cached_block
            }
        };
        tracing::info!(
            recipient = %input.recipient,
            duration_blocks = input.duration_blocks,
            unlock_block = head.saturating_add(u64::from(input.duration_blocks)),
            "Submitting capsule"
        );
        self.status.send_replace("Awaiting signature...".to_string());

        let submitted = handle
            .contract
            .create_capsule(
                &account,
                input.value,
                input.recipient,
                input.message,
                input.duration_blocks,
            )
            .await;
        let mut progress = match submitted {
            Ok(progress) => progress,
            Err(e) => return Err(self.fail(e.to_string())),
        };

        while let Some(status) = progress.next().await {
            metrics::record_transaction("create", status.label());
            match status {
                TxStatus::Submitted { tx_hash } => {
                    tracing::debug!(tx_hash = %tx_hash, "Create transaction submitted");
                }
                TxStatus::InBlock {
                    block_hash,
                    block_number,
                } => {
                    self.enter(
                        CreateState::InBlock {
                            block_hash,
                            block_number,
                        },
                        format!("Transaction in block: {}", block_hash),
                    );
                }
                TxStatus::Finalized { created, .. } => {
                    self.enter(
                        CreateState::Finalized { capsule_id: created },
                        "Capsule created successfully!",
                    );
                    tracing::info!(capsule_id = ?created, "Capsule created");
                    queries.refresh(ctx).await;
                    self.schedule_reset(ctx.status_display());
                    return Ok(created);
                }
                TxStatus::Failed(message) => return Err(self.fail(message)),
            }
        }

        Err(self.fail("status stream closed before finalization".to_string()))
    }

    fn enter(&self, state: CreateState, status: impl Into<String>) {
        self.state.send_replace(state);
        self.status.send_replace(status.into());
    }

    fn fail(&self, message: String) -> CapsuleError {
        tracing::warn!(error = %message, "Error creating capsule");
        self.enter(CreateState::Error(message.clone()), format!("Error: {}", message));
        CapsuleError::Transaction(message)
    }

    fn schedule_reset(&self, delay: std::time::Duration) {
        let state = Arc::clone(&self.state);
        let status = Arc::clone(&self.status);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.send_replace(CreateState::Idle);
            status.send_replace(String::new());
        });
        let mut slot = self.reset_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    fn cancel_reset(&self) {
        let mut slot = self.reset_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
    }
}

impl Default for CreateCapsuleForm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CreateCapsuleForm {
    fn drop(&mut self) {
        let task = self
            .reset_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> CapsuleDraft {
        CapsuleDraft {
            recipient: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
            message: "open me later".to_string(),
            duration: "100".to_string(),
            value: "0.5".to_string(),
        }
    }

    #[test]
    fn test_valid_draft() {
        let input = validate_draft(&draft(), 18).unwrap();
        assert_eq!(input.duration_blocks, 100);
        assert_eq!(input.value, U256::from(500_000_000_000_000_000u64));
        assert_eq!(input.message, Bytes::from_static(b"open me later"));
    }

    #[test]
    fn test_all_field_errors_collected() {
        let bad = CapsuleDraft {
            recipient: String::new(),
            message: "  ".to_string(),
            duration: "0".to_string(),
            value: "-1".to_string(),
        };
        let errors = validate_draft(&bad, 18).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["recipient", "message", "duration", "value"]);
    }

    #[test]
    fn test_invalid_recipient() {
        let bad = CapsuleDraft {
            recipient: "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY".to_string(),
            ..draft()
        };
        let errors = validate_draft(&bad, 18).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Recipient is not a valid address.");
    }

    #[test]
    fn test_duration_must_be_a_positive_integer() {
        for duration in ["", "abc", "-5", "1.5", "0"] {
            let bad = CapsuleDraft {
                duration: duration.to_string(),
                ..draft()
            };
            let errors = validate_draft(&bad, 18).unwrap_err();
            assert_eq!(errors[0].field, "duration", "duration {:?}", duration);
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("", 18).unwrap(), U256::ZERO);
        assert_eq!(parse_value("0", 18).unwrap(), U256::ZERO);
        assert_eq!(parse_value("1", 10).unwrap(), U256::from(10_000_000_000u64));
        assert!(parse_value("-0.1", 18).is_err());
        assert!(parse_value("abc", 18).is_err());
    }

    #[test]
    fn test_value_precision_is_never_truncated() {
        assert_eq!(
            parse_value("0.0000000000000000001", 18).unwrap_err(),
            "Value has more than 18 decimal places."
        );
        assert_eq!(
            parse_value("1.23456789", 2).unwrap_err(),
            "Value has more than 2 decimal places."
        );
        assert_eq!(parse_value("1.23", 2).unwrap(), U256::from(123u64));
        assert_eq!(parse_value("1.2300", 2).unwrap(), U256::from(123u64));
        assert_eq!(parse_value("0.000000000000000001", 18).unwrap(), U256::from(1u64));
    }

    #[test]
    fn test_dust_value_fails_validation() {
        let bad = CapsuleDraft {
            value: "0.0000000000000000001".to_string(),
            ..draft()
        };
        let errors = validate_draft(&bad, 18).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "value");
    }

    #[test]
    fn test_enabled_states() {
        assert!(CreateState::Idle.is_enabled());
        assert!(CreateState::Error("x".into()).is_enabled());
        assert!(CreateState::Finalized { capsule_id: None }.is_enabled());
        assert!(!CreateState::Submitting.is_enabled());
        assert!(!CreateState::InBlock {
            block_hash: B256::ZERO,
            block_number: 1
        }
        .is_enabled());
    }
}
