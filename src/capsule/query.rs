//! Capsule discovery for the selected account.
//!
//! # Responsibilities
//! - Read the total count, fetch each index, keep capsules involving the owner
//! - Publish a consistent snapshot; a failed count aborts without publishing
//! - Skip single indices that fail or do not decode
//! - Drop results of stale fetches (latest request wins)
//! - Remember messages revealed by successful opens until the owner changes
//!
//! # Fetch Cycle
//! ```text
//! trigger ─▶ generation += 1 ─▶ total_capsules ─▶ capsule(0..total)
//!                                                     │ filter + decode
//!                                                     ▼
//!                     still latest and same owner? ─▶ publish ─▶ FetchOutcome event
//! ```

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use arc_swap::{ArcSwap, ArcSwapOption};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::capsule::types::Capsule;
use crate::chain::{CapsuleContract, CapsuleId, ChainResult};
use crate::context::AppContext;
use crate::observability::metrics;

/// Why a fetch did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConnected,
    NoAccount,
}

/// Result of one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Preconditions missing; nothing was queried.
    Skipped(SkipReason),
    /// The total count could not be read; the previous list stays.
    Aborted(String),
    /// A newer fetch started, or the account changed, while this one ran.
    Superseded,
    /// The list was replaced.
    Completed {
        retained: usize,
        scanned: u64,
        skipped: u64,
    },
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Skipped(_) => "skipped",
            FetchOutcome::Aborted(_) => "aborted",
            FetchOutcome::Superseded => "superseded",
            FetchOutcome::Completed { .. } => "completed",
        }
    }
}

/// Capsules collected by one scan over the contract.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    pub capsules: Vec<Capsule>,
    /// Indices examined, equal to the total count.
    pub total: u64,
    /// Indices that failed to load or decode.
    pub skipped: u64,
}

/// Walk every capsule index and keep those involving `owner`.
///
/// Only a failure of the total count is fatal. Per-index failures are
/// logged and counted.
pub async fn scan_capsules(contract: &dyn CapsuleContract, owner: Address) -> ChainResult<Scan> {
    let total = contract.total_capsules(owner).await;
    metrics::record_query("total", total.is_ok());
    let total = total?;

    let mut scan = Scan {
        total,
        ..Default::default()
    };

    for id in 0..total {
        let fetched = contract.capsule(owner, id).await;
        metrics::record_query("capsule", fetched.is_ok());

        let raw = match fetched {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(id, "Capsule slot empty");
                continue;
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "Failed to fetch capsule, skipping");
                scan.skipped += 1;
                continue;
            }
        };

        if raw.creator != owner && raw.recipient != owner {
            continue;
        }

        match Capsule::from_raw(id, raw) {
            Ok(capsule) => scan.capsules.push(capsule),
            Err(e) => {
                tracing::warn!(id, error = %e, "Skipping capsule with undecodable message");
                scan.skipped += 1;
            }
        }
    }

    Ok(scan)
}

struct QueryState {
    capsules: ArcSwap<Vec<Capsule>>,
    owner: ArcSwapOption<Address>,
    revealed: DashMap<CapsuleId, String>,
    generation: AtomicU64,
    in_flight: AtomicUsize,
    events: broadcast::Sender<FetchOutcome>,
}

/// Keeps the published capsule list for the selected account.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CapsuleQueryService {
    inner: Arc<QueryState>,
}

struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CapsuleQueryService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(QueryState {
                capsules: ArcSwap::from_pointee(Vec::new()),
                owner: ArcSwapOption::empty(),
                revealed: DashMap::new(),
                generation: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                events,
            }),
        }
    }

    /// The last published list, in ascending id order.
    pub fn capsules(&self) -> Arc<Vec<Capsule>> {
        self.inner.capsules.load_full()
    }

    /// Account the published list belongs to.
    pub fn owner(&self) -> Option<Address> {
        self.inner.owner.load().as_deref().copied()
    }

    /// Whether any fetch is running.
    pub fn is_loading(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Receive the outcome of every fetch.
    pub fn subscribe(&self) -> broadcast::Receiver<FetchOutcome> {
        self.inner.events.subscribe()
    }

    /// Fetch and publish the capsules of the selected account.
    pub async fn fetch_capsules(&self, ctx: &AppContext) -> FetchOutcome {
        let outcome = self.run_fetch(ctx).await;
        tracing::debug!(outcome = outcome.label(), "Capsule fetch finished");
        let _ = self.inner.events.send(outcome.clone());
        outcome
    }

    /// Re-run the fetch, e.g. after a transaction finalized.
    pub async fn refresh(&self, ctx: &AppContext) -> FetchOutcome {
        self.fetch_capsules(ctx).await
    }

    /// Refresh after `delay` in the background.
    pub fn schedule_refresh(&self, ctx: Arc<AppContext>, delay: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.refresh(&ctx).await;
        })
    }

    async fn run_fetch(&self, ctx: &AppContext) -> FetchOutcome {
        let Some(handle) = ctx.connection().handle() else {
            return FetchOutcome::Skipped(SkipReason::NotConnected);
        };
        let Some(owner) = ctx.accounts().selected_address() else {
            return FetchOutcome::Skipped(SkipReason::NoAccount);
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = LoadingGuard::enter(&self.inner.in_flight);
        let started = Instant::now();

        let outcome = match scan_capsules(handle.contract.as_ref(), owner).await {
            Err(e) => {
                tracing::warn!(error = %e, owner = %owner, "Error fetching capsules");
                FetchOutcome::Aborted(e.to_string())
            }
            Ok(_) if self.inner.generation.load(Ordering::SeqCst) != generation => {
                tracing::debug!(generation, "Newer fetch started, dropping result");
                FetchOutcome::Superseded
            }
            Ok(_) if ctx.accounts().selected_address() != Some(owner) => {
                tracing::debug!(owner = %owner, "Account changed during fetch, dropping result");
                FetchOutcome::Superseded
            }
            Ok(scan) => {
                let retained = scan.capsules.len();
                self.publish(owner, scan.capsules);
                FetchOutcome::Completed {
                    retained,
                    scanned: scan.total,
                    skipped: scan.skipped,
                }
            }
        };

        metrics::record_fetch(outcome.label(), started.elapsed());
        outcome
    }

    fn publish(&self, owner: Address, capsules: Vec<Capsule>) {
        let owner_changed = self.owner() != Some(owner);
        if owner_changed {
            self.inner.revealed.clear();
        }
        metrics::record_visible(capsules.len());
        tracing::info!(owner = %owner, count = capsules.len(), "Capsule list updated");
        self.inner.capsules.store(Arc::new(capsules));
        // Owner last, so a reader never pairs the new owner with the old list.
        if owner_changed {
            self.inner.owner.store(Some(Arc::new(owner)));
        }
    }

    /// Remember the message revealed by opening capsule `id`.
    pub fn mark_revealed(&self, id: CapsuleId, message: impl Into<String>) {
        self.inner.revealed.insert(id, message.into());
    }

    /// Message revealed for `id` in this session, if any.
    pub fn revealed(&self, id: CapsuleId) -> Option<String> {
        self.inner.revealed.get(&id).map(|entry| entry.value().clone())
    }

    /// Re-fetch whenever the handle or the selected account changes.
    ///
    /// With `on_new_block` set, every new head triggers a fetch as well.
    /// Runs until `shutdown` fires.
    pub async fn follow(
        &self,
        ctx: Arc<AppContext>,
        on_new_block: bool,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut handle_rx = ctx.connection().watch_handle();
        let mut selected_rx = ctx.accounts().subscribe_selected();
        let mut block_rx = ctx.connection().subscribe_blocks();
        let mut handle_open = true;
        let mut selected_open = true;
        let mut blocks_open = on_new_block;

        self.fetch_capsules(&ctx).await;

        loop {
            tokio::select! {
                changed = handle_rx.changed(), if handle_open => {
                    if changed.is_err() {
                        handle_open = false;
                        continue;
                    }
                }
                changed = selected_rx.changed(), if selected_open => {
                    if changed.is_err() {
                        selected_open = false;
                        continue;
                    }
                }
                changed = block_rx.changed(), if blocks_open => {
                    if changed.is_err() {
                        blocks_open = false;
                        continue;
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Capsule follower received shutdown signal, exiting loop");
                    break;
                }
            }

            self.fetch_capsules(&ctx).await;
        }
    }
}

impl Default for CapsuleQueryService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapsuleQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleQueryService")
            .field("capsules", &self.inner.capsules.load().len())
            .field("owner", &self.owner())
            .field("loading", &self.is_loading())
            .finish()
    }
}
