//! The block-processing pipeline.
//!
//! Five components composed over bounded channels:
//!
//! ```text
//! Enqueuer ──heights──▶ FetchPool ──raw──▶ Processor ──batches──▶ Committer ──▶ Store
//!    1          10k       N workers   10       1        4×N each      1
//! ```
//!
//! # Backpressure
//!
//! Every inter-stage channel is bounded. A stalled committer blocks the
//! processor, which blocks the fetch workers, which stalls height
//! consumption until the enqueuer itself blocks on send. This is the
//! designed flow control; no stage buffers unboundedly.
//!
//! # Shutdown
//!
//! Closure cascades through the channels in pipeline order:
//!
//! 1. The enqueuer returns when its source is exhausted, dropping the only
//!    heights sender.
//! 2. The fetch supervisor awaits all workers; the raw channel closes when
//!    the last worker exits.
//! 3. The processor drains the raw channel, then drops both batch senders.
//! 4. The committer drains both batch channels and reports its summary.
//! 5. [`Pipeline::run`] awaits all four tasks before returning.

mod builder;
mod committer;
mod enqueuer;
mod fetch_pool;
mod processor;
pub mod testing;

pub use builder::{EnqueueSource, PipelineBuilder, PipelineConfig};
pub use committer::{Committer, PipelineSummary};
pub use enqueuer::Enqueuer;
pub use fetch_pool::FetchPool;
pub use processor::Processor;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::ports::{IndexerStore, NodeClient};
use crate::types::{EnqueueJob, EventBatch, RawBundle, TxBatch};

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL CAPACITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Capacity of the heights channel (enqueuer → fetch pool).
pub const HEIGHT_QUEUE_CAPACITY: usize = 10_000;

/// Capacity of the raw bundle channel (fetch pool → processor).
pub const RAW_QUEUE_CAPACITY: usize = 10;

/// Batch channels are bounded at this multiple of the worker count.
const BATCH_QUEUE_FACTOR: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// The assembled pipeline, ready to run once.
pub struct Pipeline {
    settings: Arc<Settings>,
    node: Arc<dyn NodeClient>,
    store: Arc<dyn IndexerStore>,
    config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish()
    }
}

impl Pipeline {
    /// Assemble a pipeline from its collaborators.
    ///
    /// `settings` should already be normalized
    /// ([`Settings::normalized`](crate::config::Settings::normalized)).
    pub fn new(
        settings: Settings,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn IndexerStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            node,
            store,
            config,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// Completes when the enqueuer's source is finite and every in-flight
    /// height has been committed or recorded as failed. With an open-ended
    /// source (follow-the-tip), runs until a fatal error.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: setup failure, a write failing twice,
    /// the reattempt-ratio breach, or a panicked task.
    #[instrument(skip_all)]
    pub async fn run(self) -> Result<PipelineSummary> {
        let settings = self.settings.clone();
        let dry_run = settings.indexer.dry_run;

        // Setup phase, before any worker starts
        if !dry_run {
            self.store
                .upsert_chain(&settings.chain.chain_id, &settings.chain.chain_name)
                .await?;
            if !self.config.custom_migrations.is_empty() {
                info!(
                    statements = self.config.custom_migrations.len(),
                    "Running custom model migrations"
                );
                self.store
                    .migrate_custom_models(&self.config.custom_migrations)
                    .await?;
            }
        }

        let batch_capacity = BATCH_QUEUE_FACTOR * settings.rpc.workers;
        let (job_tx, job_rx) = mpsc::channel::<EnqueueJob>(HEIGHT_QUEUE_CAPACITY);
        let (raw_tx, raw_rx) = mpsc::channel::<RawBundle>(RAW_QUEUE_CAPACITY);
        let (tx_batch_tx, tx_batch_rx) = mpsc::channel::<TxBatch>(batch_capacity);
        let (event_batch_tx, event_batch_rx) = mpsc::channel::<EventBatch>(batch_capacity);

        let enqueuer = Enqueuer::new(
            settings.clone(),
            self.node.clone(),
            self.store.clone(),
            self.config.enqueue_override,
        );
        let fetch_pool = FetchPool::new(settings.clone(), self.node.clone(), self.store.clone());
        let processor = Processor::new(
            settings.clone(),
            self.config.registry.clone(),
            self.config.decoder.clone(),
            self.store.clone(),
        );
        let committer = Committer::new(
            settings.clone(),
            self.config.registry.clone(),
            self.store.clone(),
        );

        info!(
            workers = settings.rpc.workers,
            dry_run,
            "Starting pipeline"
        );

        let enqueuer_task = tokio::spawn(enqueuer.run(job_tx));
        let fetch_task = tokio::spawn(fetch_pool.run(job_rx, raw_tx));
        let processor_task = tokio::spawn(processor.run(raw_rx, tx_batch_tx, event_batch_tx));
        let committer_task = tokio::spawn(committer.run(tx_batch_rx, event_batch_rx));

        let (enqueue_res, fetch_res, processor_res, committer_res) =
            tokio::join!(enqueuer_task, fetch_task, processor_task, committer_task);

        // The committer owns the fatal conditions; report it first so a
        // cascade of channel closures upstream doesn't mask the root cause.
        let summary = flatten(committer_res, "committer")?;
        flatten(processor_res, "processor")?;
        flatten(fetch_res, "fetch pool")?;
        flatten(enqueue_res, "enqueuer")?;

        info!(
            blocks = summary.blocks_indexed,
            db_writes = summary.db_writes,
            "Pipeline drained"
        );
        Ok(summary)
    }
}

/// Collapse a task join result into the task's own result.
fn flatten<T>(
    joined: std::result::Result<Result<T>, tokio::task::JoinError>,
    task: &str,
) -> Result<T> {
    joined.map_err(|e| AppError::TaskFailed(format!("{task}: {e}")))?
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::testing::{test_settings, ScriptedNode};
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn finite_run_drains_and_reports() {
        let node = ScriptedNode::with_empty_blocks(1..=5);
        let store = InMemoryStore::new();

        let mut settings = test_settings();
        settings.indexer.end_block = Some(5);

        let pipeline = Pipeline::new(
            settings,
            Arc::new(node),
            Arc::new(store.clone()),
            PipelineConfig::default(),
        );
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.blocks_indexed, 5);
        assert_eq!(store.block_heights(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn committer_error_takes_priority() {
        let node = ScriptedNode::with_empty_blocks(1..=1);
        let store = InMemoryStore::new();
        store.fail_next_tx_writes(2);

        let pipeline = Pipeline::new(
            test_settings(),
            Arc::new(node),
            Arc::new(store),
            PipelineConfig::default(),
        );
        let result = pipeline.run().await;

        assert!(matches!(
            result,
            Err(AppError::WriteRetryExhausted { kind: "tx", .. })
        ));
    }
}
