//! Render-ready views of the dashboard and its capsule cards.

use std::fmt;

use alloy::primitives::utils::format_units;
use alloy::primitives::{Address, U256};
use serde::Serialize;

use crate::capsule::query::CapsuleQueryService;
use crate::capsule::types::Capsule;
use crate::chain::CapsuleId;
use crate::context::AppContext;

/// Readiness badge of a capsule card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Readiness {
    Ready,
    Locked,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready => f.write_str("Ready to Open"),
            Readiness::Locked => f.write_str("Locked"),
        }
    }
}

/// First eight characters of an address followed by an ellipsis.
pub fn shorten_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...", &full[..8])
}

/// Format a smallest-denomination amount with `decimals` places, trailing zeros removed.
pub fn format_value(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(formatted) if formatted.contains('.') => formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
        Ok(formatted) => formatted,
        Err(_) => value.to_string(),
    }
}

/// One capsule card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapsuleView {
    pub id: CapsuleId,
    pub title: String,
    pub readiness: Readiness,
    pub recipient: String,
    pub unlock_block: u64,
    pub blocks_remaining: u64,
    /// Estimated seconds until unlock at the configured block time.
    pub eta_secs: u64,
    pub value: String,
    /// Whether the open action is offered to the viewer.
    pub can_open: bool,
    /// The message, once revealed by opening.
    pub revealed: Option<String>,
}

impl CapsuleView {
    /// Build the card for `capsule` as `viewer` sees it at `current_block`.
    pub fn build(
        capsule: &Capsule,
        viewer: Option<Address>,
        current_block: u64,
        decimals: u8,
        block_time_secs: u64,
        revealed: Option<String>,
    ) -> Self {
        let unlockable = capsule.is_unlockable(current_block);
        let blocks_remaining = capsule.blocks_remaining(current_block);
        Self {
            id: capsule.id,
            title: format!("Capsule #{}", capsule.id),
            readiness: if unlockable {
                Readiness::Ready
            } else {
                Readiness::Locked
            },
            recipient: shorten_address(&capsule.recipient),
            unlock_block: capsule.unlock_block,
            blocks_remaining,
            eta_secs: blocks_remaining.saturating_mul(block_time_secs),
            value: format_value(capsule.value_locked, decimals),
            can_open: unlockable && viewer == Some(capsule.recipient) && revealed.is_none(),
            revealed,
        }
    }
}

impl fmt::Display for CapsuleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.title, self.readiness)?;
        writeln!(f, "  To: {}", self.recipient)?;
        if self.blocks_remaining > 0 {
            writeln!(
                f,
                "  Unlocks at block: {} ({} blocks, ~{}s)",
                self.unlock_block, self.blocks_remaining, self.eta_secs
            )?;
        } else {
            writeln!(f, "  Unlocks at block: {}", self.unlock_block)?;
        }
        write!(f, "  Value: {}", self.value)?;
        if let Some(message) = &self.revealed {
            write!(f, "\n  Message: {}", message)?;
        } else if self.can_open {
            write!(f, "\n  Open Capsule")?;
        }
        Ok(())
    }
}

/// The whole dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DashboardView {
    Disconnected,
    Ready {
        account: String,
        balance: Option<String>,
        current_block: u64,
        loading: bool,
        capsules: Vec<CapsuleView>,
    },
}

impl DashboardView {
    /// Snapshot the dashboard from live state.
    pub fn build(ctx: &AppContext, queries: &CapsuleQueryService) -> Self {
        let Some(account) = ctx.accounts().selected() else {
            return DashboardView::Disconnected;
        };
        let decimals = ctx.decimals();
        let current_block = ctx.current_block();
        let block_time = ctx.config().chain.block_time_secs;
        let viewer = Some(account.address());
        // A list fetched for a previous account is not shown.
        let current_owner = queries.owner() == viewer;

        let capsules = queries
            .capsules()
            .iter()
            .filter(|capsule| current_owner && capsule.involves(account.address()))
            .map(|capsule| {
                CapsuleView::build(
                    capsule,
                    viewer,
                    current_block,
                    decimals,
                    block_time,
                    queries.revealed(capsule.id),
                )
            })
            .collect();

        DashboardView::Ready {
            account: account.label(),
            balance: ctx
                .accounts()
                .balance()
                .map(|balance| format_value(balance, decimals)),
            current_block,
            loading: queries.is_loading(),
            capsules,
        }
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardView::Disconnected => f.write_str("Please connect your wallet to begin."),
            DashboardView::Ready {
                account,
                balance,
                current_block,
                loading,
                capsules,
            } => {
                writeln!(f, "Account: {}", account)?;
                if let Some(balance) = balance {
                    writeln!(f, "Balance: {}", balance)?;
                }
                writeln!(f, "Block: #{}", current_block)?;
                writeln!(f, "Your Time Capsules")?;
                if *loading {
                    writeln!(f, "Loading capsules...")?;
                }
                if capsules.is_empty() && !*loading {
                    return f.write_str(
                        "No capsules found for your account. Create one to get started!",
                    );
                }
                for (i, capsule) in capsules.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", capsule)?;
                }
                Ok(())
            }
        }
    }
}
