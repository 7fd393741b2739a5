//! Fetch pool: N workers draining height jobs into raw bundles.
//!
//! Each worker performs the minimum set of remote calls the job's facet
//! flags require:
//!
//! 1. Fetch the block. On failure, record the height as `FETCH_FAILED` and
//!    drop the job; no bundle is emitted.
//! 2. If the event facet is requested, fetch block results; a failure sets
//!    `event_fetch_failed` but the bundle is still emitted.
//! 3. If the tx facet is requested, fetch `tx_search`; on failure fall back
//!    to block results as the tx source, and set `tx_fetch_failed` only
//!    when both are unavailable.
//!
//! There is **no ordering guarantee** between bundles of different heights;
//! the processor is order-agnostic. A single worker's calls are sequential.
//!
//! Lifecycle: workers exit when the heights channel is closed and drained.
//! The supervisor awaits all workers; the raw channel closes when the last
//! worker drops its sender.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::ports::{IndexerStore, NodeClient};
use crate::types::{EnqueueJob, FailureReason, RawBundle};

// ═══════════════════════════════════════════════════════════════════════════════
// FETCH POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Fan-out of height jobs across parallel fetch workers.
pub struct FetchPool {
    settings: Arc<Settings>,
    node: Arc<dyn NodeClient>,
    store: Arc<dyn IndexerStore>,
}

impl std::fmt::Debug for FetchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchPool")
            .field("workers", &self.settings.rpc.workers)
            .finish()
    }
}

impl FetchPool {
    /// Create a fetch pool. The worker count comes from the (normalized)
    /// settings.
    pub fn new(
        settings: Arc<Settings>,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn IndexerStore>,
    ) -> Self {
        Self {
            settings,
            node,
            store,
        }
    }

    /// Spawn the workers and supervise them until the heights channel
    /// drains.
    ///
    /// # Errors
    ///
    /// Returns an error when a worker panics or a failed-block upsert
    /// cannot reach the store.
    #[instrument(skip_all, fields(workers = self.settings.rpc.workers))]
    pub async fn run(
        self,
        jobs: mpsc::Receiver<EnqueueJob>,
        raw: mpsc::Sender<RawBundle>,
    ) -> Result<()> {
        let jobs = Arc::new(Mutex::new(jobs));
        let mut workers = JoinSet::new();

        for worker_id in 0..self.settings.rpc.workers {
            let jobs = jobs.clone();
            let raw = raw.clone();
            let node = self.node.clone();
            let store = self.store.clone();
            let settings = self.settings.clone();

            workers.spawn(async move {
                worker_loop(worker_id, &settings, node.as_ref(), store.as_ref(), &jobs, &raw).await
            });
        }
        // The workers hold the only remaining senders; the raw channel
        // closes when the last of them exits.
        drop(raw);

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| AppError::TaskFailed(format!("fetch worker: {e}")))??;
        }

        debug!("All fetch workers finished");
        Ok(())
    }
}

/// One worker: pull jobs off the shared receiver until it closes.
async fn worker_loop(
    worker_id: usize,
    settings: &Settings,
    node: &dyn NodeClient,
    store: &dyn IndexerStore,
    jobs: &Mutex<mpsc::Receiver<EnqueueJob>>,
    raw: &mpsc::Sender<RawBundle>,
) -> Result<()> {
    loop {
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else {
            debug!(worker_id, "Heights channel drained, worker exiting");
            return Ok(());
        };

        match fetch_bundle(settings, node, store, job).await? {
            Some(bundle) => {
                if raw.send(bundle).await.is_err() {
                    debug!(worker_id, "Raw channel closed downstream, worker exiting");
                    return Ok(());
                }
            }
            None => {
                // Block fetch failed; already recorded, job dropped
            }
        }
    }
}

/// Perform the remote calls for one job.
///
/// Returns `None` when the block itself could not be fetched (the job is
/// dropped after bookkeeping).
async fn fetch_bundle(
    settings: &Settings,
    node: &dyn NodeClient,
    store: &dyn IndexerStore,
    job: EnqueueJob,
) -> Result<Option<RawBundle>> {
    let height = job.height;
    let chain = &settings.chain;

    let block = match node.block(height).await {
        Ok(block) => block,
        Err(e) => {
            warn!(%height, error = %e, "Block fetch failed, recording and dropping job");
            store
                .upsert_failed_block(height, &chain.chain_id, &chain.chain_name, FailureReason::FetchFailed)
                .await?;
            return Ok(None);
        }
    };

    let mut bundle = RawBundle {
        height,
        block,
        results: None,
        tx_search: None,
        index_txs: job.index_txs,
        index_events: job.index_events,
        tx_fetch_failed: false,
        event_fetch_failed: false,
    };

    if job.index_events {
        match node.block_results(height).await {
            Ok(results) => bundle.results = Some(results),
            Err(e) => {
                warn!(%height, error = %e, "Block results fetch failed, event facet skipped");
                bundle.event_fetch_failed = true;
            }
        }
    }

    if job.index_txs {
        match node.tx_search(height).await {
            Ok(response) => bundle.tx_search = Some(response),
            Err(e) => {
                warn!(%height, error = %e, "tx_search failed, deriving txs from block results");
                if bundle.results.is_none() {
                    match node.block_results(height).await {
                        Ok(results) => bundle.results = Some(results),
                        Err(e2) => {
                            warn!(%height, error = %e2, "Block results fallback failed, tx facet skipped");
                            bundle.tx_fetch_failed = true;
                        }
                    }
                }
            }
        }
    }

    // A partially fetched height is still emitted, but the failure is
    // recorded so the height is never silently short-indexed.
    if bundle.tx_fetch_failed || bundle.event_fetch_failed {
        store
            .upsert_failed_block(height, &chain.chain_id, &chain.chain_name, FailureReason::FetchFailed)
            .await?;
    }

    Ok(Some(bundle))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
