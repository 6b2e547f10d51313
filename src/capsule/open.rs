//! Open action for one capsule.
//!
//! # State Machine
//! ```text
//! Idle ──open (checks pass)──▶ Opening ──finalized──▶ Revealed(message)
//!                                 │
//!                                 └──failure──▶ Error ──open──▶ Opening
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use crate::capsule::query::CapsuleQueryService;
use crate::capsule::types::{Capsule, CapsuleError, CapsuleResult, OpenRejection};
use crate::chain::TxStatus;
use crate::context::AppContext;
use crate::observability::metrics;

/// Where an open action is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenState {
    Idle,
    Opening,
    Revealed(String),
    Error(String),
}

/// Check whether the selected account may open `capsule` right now.
pub fn check_open(
    ctx: &AppContext,
    queries: &CapsuleQueryService,
    capsule: &Capsule,
) -> Result<(), OpenRejection> {
    if !ctx.connection().is_ready() {
        return Err(OpenRejection::NotConnected);
    }
    let selected = ctx
        .accounts()
        .selected_address()
        .ok_or(OpenRejection::NoAccount)?;
    if selected != capsule.recipient {
        return Err(OpenRejection::NotRecipient);
    }
    let current = ctx.current_block();
    if !capsule.is_unlockable(current) {
        return Err(OpenRejection::StillLocked {
            blocks_remaining: capsule.blocks_remaining(current),
        });
    }
    if queries.revealed(capsule.id).is_some() {
        return Err(OpenRejection::AlreadyRevealed);
    }
    Ok(())
}

/// Drives the open action of a single capsule card.
pub struct CapsuleOpener {
    state: watch::Sender<OpenState>,
    status: watch::Sender<String>,
}

impl CapsuleOpener {
    pub fn new() -> Self {
        let (state, _) = watch::channel(OpenState::Idle);
        let (status, _) = watch::channel(String::new());
        Self { state, status }
    }

    pub fn state(&self) -> OpenState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OpenState> {
        self.state.subscribe()
    }

    pub fn status(&self) -> String {
        self.status.borrow().clone()
    }

    /// Submit `openCapsule` for `capsule` and reveal its message on finality.
    ///
    /// Rejected preconditions leave the state untouched and submit nothing.
    /// After a reveal the list is refreshed once the status display delay
    /// has passed.
    pub async fn open(
        &self,
        ctx: &Arc<AppContext>,
        queries: &CapsuleQueryService,
        capsule: &Capsule,
    ) -> CapsuleResult<String> {
        if *self.state.borrow() == OpenState::Opening {
            return Err(CapsuleError::Busy);
        }
        check_open(ctx, queries, capsule).map_err(CapsuleError::Rejected)?;

        let (Some(handle), Some(account)) = (ctx.connection().handle(), ctx.accounts().selected())
        else {
            return Err(CapsuleError::NotReady("connection or account lost"));
        };

        let claimed = self.state.send_if_modified(|state| {
            if *state == OpenState::Opening {
                false
            } else {
                *state = OpenState::Opening;
                true
            }
        });
        if !claimed {
            return Err(CapsuleError::Busy);
        }
        self.status.send_replace("Preparing to open...".to_string());
        tracing::info!(capsule_id = capsule.id, "Opening capsule");

        let mut progress = match handle.contract.open_capsule(&account, capsule.id).await {
            Ok(progress) => progress,
            Err(e) => return Err(self.fail(e.to_string())),
        };

        while let Some(status) = progress.next().await {
            metrics::record_transaction("open", status.label());
            match status {
                TxStatus::Submitted { tx_hash } => {
                    tracing::debug!(tx_hash = %tx_hash, capsule_id = capsule.id, "Open transaction submitted");
                }
                TxStatus::InBlock { block_hash, .. } => {
                    self.status
                        .send_replace(format!("Transaction in block: {}", block_hash));
                }
                TxStatus::Finalized { .. } => {
                    let message = capsule.message.clone();
                    self.enter(OpenState::Revealed(message.clone()), "Capsule opened!");
                    queries.mark_revealed(capsule.id, message.clone());
                    tracing::info!(capsule_id = capsule.id, "Capsule opened");
                    queries.schedule_refresh(Arc::clone(ctx), ctx.status_display());
                    return Ok(message);
                }
                TxStatus::Failed(message) => return Err(self.fail(message)),
            }
        }

        Err(self.fail("status stream closed before finalization".to_string()))
    }

    fn enter(&self, state: OpenState, status: impl Into<String>) {
        self.state.send_replace(state);
        self.status.send_replace(status.into());
    }

    fn fail(&self, message: String) -> CapsuleError {
        tracing::warn!(error = %message, "Error opening capsule");
        self.enter(OpenState::Error(message.clone()), format!("Error: {}", message));
        CapsuleError::Transaction(message)
    }
}

impl Default for CapsuleOpener {
    fn default() -> Self {
        Self::new()
    }
}
