//! Height enqueuer: the pipeline's sole producer of work.
//!
//! Three operating modes, selected by configuration:
//!
//! 1. **Default** - walk from `start_block` toward the node's tip; with no
//!    `end_block` configured, follow the tip indefinitely on a poll interval
//! 2. **File** - read heights from a newline-delimited file, in file order;
//!    duplicates are allowed and re-processed
//! 3. **Reindex-message-type** - query the store for heights that
//!    historically contained a given message type and emit only those, with
//!    the event facet disabled
//!
//! An embedder-injected [`EnqueueSource`] supersedes mode selection.
//!
//! The enqueuer is the sole closer of the heights channel: it closes by
//! returning, which drops the only sender. Backpressure comes from the
//! bounded channel; sends block when the fetch pool is saturated.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::builder::EnqueueSource;
use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::ports::{IndexerStore, NodeClient};
use crate::types::{EnqueueJob, Height};

// ═══════════════════════════════════════════════════════════════════════════════
// ENQUEUER
// ═══════════════════════════════════════════════════════════════════════════════

/// Produces the finite or open-ended sequence of heights to index.
pub struct Enqueuer {
    settings: Arc<Settings>,
    node: Arc<dyn NodeClient>,
    store: Arc<dyn IndexerStore>,
    override_source: Option<Box<dyn EnqueueSource>>,
}

impl std::fmt::Debug for Enqueuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enqueuer")
            .field("override_source", &self.override_source.is_some())
            .finish()
    }
}

impl Enqueuer {
    /// Create an enqueuer.
    pub fn new(
        settings: Arc<Settings>,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn IndexerStore>,
        override_source: Option<Box<dyn EnqueueSource>>,
    ) -> Self {
        Self {
            settings,
            node,
            store,
            override_source,
        }
    }

    /// Run until the height source is exhausted, then close the channel by
    /// dropping the sender.
    ///
    /// # Errors
    ///
    /// Returns an error when the node is unreachable during startup, the
    /// block input file is unreadable, or the store lookup for reindex mode
    /// fails. A closed channel is a normal stop, not an error.
    #[instrument(skip_all)]
    pub async fn run(mut self, jobs: mpsc::Sender<EnqueueJob>) -> Result<()> {
        if self.settings.indexer.wait_for_chain {
            self.wait_for_chain().await?;
        }

        if let Some(source) = self.override_source.take() {
            info!("Custom enqueue source injected, superseding mode selection");
            return source.run(jobs).await;
        }

        if let Some(message_type) = self.settings.indexer.reindex_message_type.clone() {
            self.run_reindex(&jobs, &message_type).await
        } else if let Some(path) = self.settings.indexer.block_input_file.clone() {
            self.run_file(&jobs, &path).await
        } else {
            self.run_default(&jobs).await
        }
    }

    /// Delay initial emission until the node reports it has caught up.
    async fn wait_for_chain(&self) -> Result<()> {
        let delay = self.settings.indexer.wait_for_chain_delay();
        let mut attempts = 0u64;

        loop {
            let status = self.node.status().await?;
            if status.is_caught_up() {
                info!(
                    tip = status.latest_height(),
                    attempts, "Chain caught up, starting enqueue"
                );
                return Ok(());
            }
            attempts += 1;
            info!(
                tip = status.latest_height(),
                attempts,
                delay_secs = delay.as_secs(),
                "Chain still catching up, waiting"
            );
            sleep(delay).await;
        }
    }

    /// Default mode: walk from `start_block` toward the tip; follow the tip
    /// when no `end_block` is configured.
    async fn run_default(&self, jobs: &mpsc::Sender<EnqueueJob>) -> Result<()> {
        let index_txs = self.settings.indexer.index_transactions;
        let index_events = self.settings.indexer.index_block_events;
        let end_block = self.settings.indexer.end_block;
        let poll_interval = self.settings.rpc.poll_interval();

        // start_block = 0 is coerced to 1 by Settings::normalized; guard anyway
        let mut next = self.settings.indexer.start_block.max(1);

        info!(
            start = next,
            end = ?end_block,
            "Enqueuing heights"
        );

        loop {
            let status = self.node.status().await?;
            let tip = status.latest_height();
            let target = end_block.map_or(tip, |end| end.min(tip));

            while next <= target {
                let job = EnqueueJob {
                    height: Height::new(next),
                    index_txs,
                    index_events,
                };
                if jobs.send(job).await.is_err() {
                    debug!("Heights channel closed downstream, stopping enqueue");
                    return Ok(());
                }
                next += 1;
            }

            if let Some(end) = end_block {
                if next > end {
                    info!(last = end, "Reached end block, closing heights channel");
                    return Ok(());
                }
            }

            debug!(tip, next, "Caught up with tip, polling for new blocks");
            sleep(poll_interval).await;
        }
    }

    /// File mode: newline-delimited heights, in file order.
    async fn run_file(&self, jobs: &mpsc::Sender<EnqueueJob>, path: &str) -> Result<()> {
        let contents = tokio::fs::read_to_string(path).await?;
        let index_txs = self.settings.indexer.index_transactions;
        let index_events = self.settings.indexer.index_block_events;

        info!(path, "Enqueuing heights from input file");

        let mut enqueued = 0u64;
        for (line_number, line) in contents.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let height: u64 = trimmed.parse().map_err(|_| {
                AppError::Setup(format!(
                    "invalid height '{trimmed}' on line {} of {path}",
                    line_number + 1
                ))
            })?;

            let job = EnqueueJob {
                height: Height::new(height),
                index_txs,
                index_events,
            };
            if jobs.send(job).await.is_err() {
                debug!("Heights channel closed downstream, stopping enqueue");
                return Ok(());
            }
            enqueued += 1;
        }

        info!(enqueued, "Input file exhausted, closing heights channel");
        Ok(())
    }

    /// Reindex mode: heights that historically contained a message type,
    /// transactions only.
    async fn run_reindex(
        &self,
        jobs: &mpsc::Sender<EnqueueJob>,
        message_type: &str,
    ) -> Result<()> {
        let heights = self.store.blocks_with_message_type(message_type).await?;

        if heights.is_empty() {
            warn!(message_type, "No indexed blocks contain this message type");
        }
        info!(
            message_type,
            count = heights.len(),
            "Enqueuing heights for message type reindex"
        );

        for height in heights {
            if jobs.send(EnqueueJob::txs_only(height)).await.is_err() {
                debug!("Heights channel closed downstream, stopping enqueue");
                return Ok(());
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{test_settings, ScriptedNode};
    use crate::store::InMemoryStore;
    use crate::types::BlockRecord;
    use chrono::Utc;

    fn enqueuer_with(
        settings: Settings,
        node: ScriptedNode,
        store: InMemoryStore,
    ) -> Enqueuer {
        Enqueuer::new(
            Arc::new(settings),
            Arc::new(node),
            Arc::new(store),
            None,
        )
    }

    #[tokio::test]
    async fn default_mode_emits_range() {
        let mut settings = test_settings();
        settings.indexer.start_block = 3;
        settings.indexer.end_block = Some(6);

        let node = ScriptedNode::with_empty_blocks(1..=10);
        let enqueuer = enqueuer_with(settings, node, InMemoryStore::new());

        let (tx, mut rx) = mpsc::channel(64);
        enqueuer.run(tx).await.unwrap();

        let mut heights = Vec::new();
        while let Some(job) = rx.recv().await {
            assert!(job.index_txs && job.index_events);
            heights.push(job.height.value());
        }
        assert_eq!(heights, vec![3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn default_mode_clamps_to_tip_then_polls() {
        // Tip is 4; end_block 4 keeps the run finite
        let mut settings = test_settings();
        settings.indexer.start_block = 1;
        settings.indexer.end_block = Some(4);

        let node = ScriptedNode::with_empty_blocks(1..=4);
        let enqueuer = enqueuer_with(settings, node, InMemoryStore::new());

        let (tx, mut rx) = mpsc::channel(64);
        enqueuer.run(tx).await.unwrap();

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn file_mode_preserves_order_and_duplicates() {
        let dir = std::env::temp_dir();
        let path = dir.join("chain_indexer_enqueue_file_test.txt");
        std::fs::write(&path, "5\n3\n5\n\n7\n").unwrap();

        let mut settings = test_settings();
        settings.indexer.block_input_file = Some(path.display().to_string());

        let node = ScriptedNode::with_empty_blocks(1..=10);
        let enqueuer = enqueuer_with(settings, node, InMemoryStore::new());

        let (tx, mut rx) = mpsc::channel(64);
        enqueuer.run(tx).await.unwrap();

        let mut heights = Vec::new();
        while let Some(job) = rx.recv().await {
            heights.push(job.height.value());
        }
        assert_eq!(heights, vec![5, 3, 5, 7]);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn file_mode_rejects_garbage() {
        let dir = std::env::temp_dir();
        let path = dir.join("chain_indexer_enqueue_bad_file_test.txt");
        std::fs::write(&path, "5\nnot-a-height\n").unwrap();

        let mut settings = test_settings();
        settings.indexer.block_input_file = Some(path.display().to_string());

        let node = ScriptedNode::with_empty_blocks(1..=10);
        let enqueuer = enqueuer_with(settings, node, InMemoryStore::new());

        let (tx, _rx) = mpsc::channel(64);
        let result = enqueuer.run(tx).await;
        assert!(matches!(result, Err(AppError::Setup(_))));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn reindex_mode_emits_tx_only_jobs() {
        let store = InMemoryStore::new();
        let record = BlockRecord {
            chain_id: "testchain-1".into(),
            height: Height::new(8),
            timestamp: Utc::now(),
            proposer: "PROP".into(),
            hash: "HH".into(),
        };
        store.seed_block_with_message(8, record, "/bank.v1.MsgSend");

        let mut settings = test_settings();
        settings.indexer.reindex_message_type = Some("/bank.v1.MsgSend".into());

        let node = ScriptedNode::with_empty_blocks(1..=10);
        let enqueuer = enqueuer_with(settings, node, store);

        let (tx, mut rx) = mpsc::channel(64);
        enqueuer.run(tx).await.unwrap();

        let job = rx.recv().await.unwrap();
        assert_eq!(job.height.value(), 8);
        assert!(job.index_txs);
        assert!(!job.index_events);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn wait_for_chain_delays_until_caught_up() {
        let mut settings = test_settings();
        settings.indexer.start_block = 1;
        settings.indexer.end_block = Some(2);
        settings.indexer.wait_for_chain = true;
        settings.indexer.wait_for_chain_delay_secs = 0;

        let node = ScriptedNode::with_empty_blocks(1..=2);
        node.set_catching_up_for(2);

        let enqueuer = enqueuer_with(settings, node, InMemoryStore::new());

        let (tx, mut rx) = mpsc::channel(64);
        enqueuer.run(tx).await.unwrap();

        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }
}
