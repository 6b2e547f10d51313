//! The single long-lived chain connection.
//!
//! # Responsibilities
//! - Open one connection to the configured node in the background
//! - Publish the handle once ready (`None` until then is a normal state)
//! - Derive the contract handle from the fixed address and interface
//! - Follow new heads and republish the height, never going backwards
//!
//! # Lifecycle
//! ```text
//! open() ─▶ connect task ─▶ handle published ─▶ block follower loop
//!                                                  │
//! close() / drop ─▶ Shutdown::trigger ─────────────┘ (loop exits)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::chain::backend::{ChainHandle, ChainReader};
use crate::chain::client::ChainClient;
use crate::chain::contract::AlloyCapsuleContract;
use crate::chain::types::ChainConfig;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Process-wide chain connection.
pub struct ChainConnection {
    handle: watch::Receiver<Option<ChainHandle>>,
    block: watch::Receiver<u64>,
    shutdown: Shutdown,
    task: Option<JoinHandle<()>>,
}

impl ChainConnection {
    /// Connect to the configured node in the background.
    pub fn open(config: ChainConfig) -> Self {
        let (handle_tx, handle_rx) = watch::channel(None);
        let (block_tx, block_rx) = watch::channel(0u64);
        let shutdown = Shutdown::new();
        let mut shutdown_rx = shutdown.subscribe();
        let poll_interval = Duration::from_millis(config.block_poll_interval_ms);

        let task = tokio::spawn(async move {
            let client = match ChainClient::new(config).await {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!(error = %e, "Chain connection could not be opened");
                    return;
                }
            };

            // The handle stays unpublished until the node answers.
            loop {
                match client.get_block_number().await {
                    Ok(_) => break,
                    Err(e) => {
                        metrics::record_rpc_health(false);
                        tracing::warn!(error = %e, "Node not reachable yet");
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown_rx.recv() => return,
                }
            }
            metrics::record_rpc_health(true);

            let contract = match AlloyCapsuleContract::new(client.clone()) {
                Ok(contract) => contract,
                Err(e) => {
                    tracing::error!(error = %e, "Contract handle could not be derived");
                    return;
                }
            };
            tracing::info!(contract = %contract.address(), "Contract handle ready");

            let handle = ChainHandle::new(Arc::new(client), Arc::new(contract));
            handle_tx.send_replace(Some(handle.clone()));
            follow_blocks(handle.reader, poll_interval, block_tx, shutdown_rx).await;
        });

        Self {
            handle: handle_rx,
            block: block_rx,
            shutdown,
            task: Some(task),
        }
    }

    /// Wrap an already connected handle and follow its heads.
    pub fn with_handle(handle: ChainHandle, poll_interval: Duration) -> Self {
        let (_, handle_rx) = watch::channel(Some(handle.clone()));
        let (block_tx, block_rx) = watch::channel(0u64);
        let shutdown = Shutdown::new();
        let shutdown_rx = shutdown.subscribe();

        let task = tokio::spawn(follow_blocks(handle.reader, poll_interval, block_tx, shutdown_rx));

        Self {
            handle: handle_rx,
            block: block_rx,
            shutdown,
            task: Some(task),
        }
    }

    /// A connection that never becomes ready.
    pub fn disconnected() -> Self {
        let (_, handle_rx) = watch::channel(None);
        let (_, block_rx) = watch::channel(0u64);
        Self {
            handle: handle_rx,
            block: block_rx,
            shutdown: Shutdown::new(),
            task: None,
        }
    }

    /// The live handle, or `None` while not connected.
    pub fn handle(&self) -> Option<ChainHandle> {
        self.handle.borrow().clone()
    }

    /// Whether the handle is available.
    pub fn is_ready(&self) -> bool {
        self.handle.borrow().is_some()
    }

    /// Watch the handle slot.
    pub fn watch_handle(&self) -> watch::Receiver<Option<ChainHandle>> {
        self.handle.clone()
    }

    /// Wait until the handle is available, up to `limit`.
    pub async fn ready(&self, limit: Duration) -> Option<ChainHandle> {
        let mut rx = self.handle.clone();
        let waited = tokio::time::timeout(limit, async {
            match rx.wait_for(Option::is_some).await {
                Ok(handle) => handle.clone(),
                Err(_) => None,
            }
        })
        .await;
        waited.ok().flatten()
    }

    /// Latest published block height (0 before the first head).
    pub fn current_block(&self) -> u64 {
        *self.block.borrow()
    }

    /// Watch block height updates.
    pub fn subscribe_blocks(&self) -> watch::Receiver<u64> {
        self.block.clone()
    }

    /// Wait until the published height reaches `min`, up to `limit`.
    pub async fn wait_for_block(&self, min: u64, limit: Duration) -> Option<u64> {
        let mut rx = self.block.clone();
        let waited = tokio::time::timeout(limit, async {
            match rx.wait_for(|height| *height >= min).await {
                Ok(height) => Some(*height),
                Err(_) => None,
            }
        })
        .await;
        waited.ok().flatten()
    }

    /// Stop following heads. The last published values stay readable.
    pub fn close(&mut self) {
        self.shutdown.trigger();
        if let Some(task) = self.task.take() {
            // The connect step may still be in flight; it holds no subscription yet.
            task.abort();
        }
    }
}

impl Drop for ChainConnection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChainConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConnection")
            .field("ready", &self.is_ready())
            .field("current_block", &self.current_block())
            .finish()
    }
}

/// Poll for new heads and publish strictly increasing heights.
pub async fn follow_blocks(
    reader: Arc<dyn ChainReader>,
    poll_interval: Duration,
    block: watch::Sender<u64>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match reader.block_number().await {
                    Ok(height) => {
                        let advanced = block.send_if_modified(|current| {
                            if height > *current {
                                *current = height;
                                true
                            } else {
                                false
                            }
                        });
                        if advanced {
                            metrics::record_block_height(height);
                            tracing::trace!(height, "New head");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Block height query failed"),
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("Block follower received shutdown signal, exiting loop");
                break;
            }
        }
    }
}
