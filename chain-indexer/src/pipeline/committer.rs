//! Committer: drains the batch channels into the store.
//!
//! Single consumer selecting non-deterministically between the tx-batch and
//! event-batch channels until both close. Per batch:
//!
//! - write the batch in one store transaction; on failure retry exactly
//!   once; a second failure aborts the run
//! - persist custom-parser artifacts keyed by their tracker rows
//! - in dry-run mode, skip writes but keep counting
//!
//! # Write health
//!
//! The committer tracks `db_writes` and `db_reattempts` cumulatively. At
//! every `block_timer` boundary it logs throughput over the window and
//! aborts when reattempts exceed 10% of writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;
use crate::error::{AppError, Result};
use crate::parsers::ParserRegistry;
use crate::ports::{IndexerStore, ParserTracker};
use crate::types::{EventBatch, Height, TxBatch};

// ═══════════════════════════════════════════════════════════════════════════════
// SUMMARY
// ═══════════════════════════════════════════════════════════════════════════════

/// Progress counters reported when the pipeline drains.
///
/// Dry runs produce the same counters as real runs over the same input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Heights whose primary batch was committed (or counted, in dry run).
    pub blocks_indexed: u64,
    /// Successful store writes (batches, not rows).
    pub db_writes: u64,
    /// Writes that needed their one-shot retry.
    pub db_reattempts: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMITTER
// ═══════════════════════════════════════════════════════════════════════════════

struct CommitState {
    summary: PipelineSummary,
    window_start: Instant,
}

/// Drains parsed batches into the store with bounded retry and health
/// tracking.
pub struct Committer {
    settings: Arc<Settings>,
    registry: Arc<ParserRegistry>,
    store: Arc<dyn IndexerStore>,
}

impl std::fmt::Debug for Committer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Committer")
            .field("dry_run", &self.settings.indexer.dry_run)
            .finish()
    }
}

impl Committer {
    /// Create a committer.
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<ParserRegistry>,
        store: Arc<dyn IndexerStore>,
    ) -> Self {
        Self {
            settings,
            registry,
            store,
        }
    }

    /// Drain both channels until they close, then report the summary.
    ///
    /// # Errors
    ///
    /// Returns an error when a batch write fails twice, the reattempt ratio
    /// breaches 10%, or tracker setup fails.
    #[instrument(skip_all)]
    pub async fn run(
        self,
        mut tx_batches: mpsc::Receiver<TxBatch>,
        mut event_batches: mpsc::Receiver<EventBatch>,
    ) -> Result<PipelineSummary> {
        let dry_run = self.settings.indexer.dry_run;

        // Trackers are persisted once per run so artifacts can reference a
        // stable row. Dry runs write nothing, trackers included.
        let message_trackers = if dry_run || self.registry.message_parser_identifiers().is_empty()
        {
            HashMap::new()
        } else {
            self.store
                .find_or_create_custom_message_parsers(self.registry.message_parser_identifiers())
                .await?
        };
        let event_registrations = self.registry.block_event_parser_registrations();
        let event_trackers = if dry_run || event_registrations.is_empty() {
            HashMap::new()
        } else {
            self.store
                .find_or_create_custom_block_event_parsers(&event_registrations)
                .await?
        };

        let mut state = CommitState {
            summary: PipelineSummary::default(),
            window_start: Instant::now(),
        };
        let mut tx_open = true;
        let mut events_open = true;

        while tx_open || events_open {
            tokio::select! {
                batch = tx_batches.recv(), if tx_open => {
                    match batch {
                        Some(batch) => {
                            self.commit_tx_batch(batch, &message_trackers, &mut state).await?;
                        }
                        None => tx_open = false,
                    }
                }
                batch = event_batches.recv(), if events_open => {
                    match batch {
                        Some(batch) => {
                            self.commit_event_batch(batch, &event_trackers, &mut state).await?;
                        }
                        None => events_open = false,
                    }
                }
            }
        }

        info!(
            blocks = state.summary.blocks_indexed,
            db_writes = state.summary.db_writes,
            db_reattempts = state.summary.db_reattempts,
            "Committer drained"
        );
        Ok(state.summary)
    }

    /// Commit one tx batch: block + txs + messages, then custom artifacts.
    async fn commit_tx_batch(
        &self,
        batch: TxBatch,
        trackers: &HashMap<String, ParserTracker>,
        state: &mut CommitState,
    ) -> Result<()> {
        let height = batch.block.height;

        if self.settings.indexer.dry_run {
            debug!(%height, txs = batch.txs.len(), "Dry run, tx batch counted");
            state.summary.db_writes += 1;
            return self.finish_block(state, height, true);
        }

        let dataset = match self.store.index_new_block(&batch).await {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(%height, error = %e, "Block write failed, retrying once");
                state.summary.db_reattempts += 1;
                counter!("indexer_db_reattempts").increment(1);
                match self.store.index_new_block(&batch).await {
                    Ok(dataset) => dataset,
                    Err(e2) => {
                        error!(%height, error = %e2, "Second block write failed, aborting");
                        return Err(AppError::WriteRetryExhausted {
                            height: height.value(),
                            kind: "tx",
                        });
                    }
                }
            }
        };
        state.summary.db_writes += 1;
        counter!("indexer_db_writes").increment(1);

        if batch.has_artifacts() && !trackers.is_empty() {
            self.store
                .index_custom_messages(&dataset, &batch, trackers)
                .await?;
        }

        self.finish_block(state, height, true)
    }

    /// Commit one event batch, then custom artifacts.
    ///
    /// Event writes get the same one-shot retry as tx writes; the store's
    /// natural-key upserts make the retry safe.
    async fn commit_event_batch(
        &self,
        batch: EventBatch,
        trackers: &HashMap<String, ParserTracker>,
        state: &mut CommitState,
    ) -> Result<()> {
        let height = batch.block.height;
        let dry_run = self.settings.indexer.dry_run;
        // Event batches stand in for blocks when the tx facet is disabled
        let counts_block = !self.settings.indexer.index_transactions;

        if dry_run {
            debug!(%height, events = batch.len(), "Dry run, event batch counted");
            state.summary.db_writes += 1;
            return self.finish_block(state, height, counts_block);
        }

        let dataset = match self.store.index_block_events(&batch, false).await {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(%height, error = %e, "Event write failed, retrying once");
                state.summary.db_reattempts += 1;
                counter!("indexer_db_reattempts").increment(1);
                match self.store.index_block_events(&batch, false).await {
                    Ok(dataset) => dataset,
                    Err(e2) => {
                        error!(%height, error = %e2, "Second event write failed, aborting");
                        return Err(AppError::WriteRetryExhausted {
                            height: height.value(),
                            kind: "event",
                        });
                    }
                }
            }
        };
        state.summary.db_writes += 1;
        counter!("indexer_db_writes").increment(1);

        if batch.has_artifacts() && !trackers.is_empty() {
            self.store
                .index_custom_block_events(&dataset, &batch, trackers)
                .await?;
        }

        self.finish_block(state, height, counts_block)
    }

    /// Per-block bookkeeping: progress counters, throughput log, write
    /// health check.
    fn finish_block(
        &self,
        state: &mut CommitState,
        height: Height,
        counts_block: bool,
    ) -> Result<()> {
        if !counts_block {
            return Ok(());
        }

        state.summary.blocks_indexed += 1;
        counter!("indexer_blocks_indexed").increment(1);

        let block_timer = self.settings.indexer.block_timer;
        if block_timer == 0 || state.summary.blocks_indexed % block_timer != 0 {
            return Ok(());
        }

        let elapsed = state.window_start.elapsed();
        state.window_start = Instant::now();
        // Precision loss is acceptable for a throughput log line
        #[allow(clippy::cast_precision_loss)]
        let rate = block_timer as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            %height,
            blocks = state.summary.blocks_indexed,
            blocks_per_sec = format!("{rate:.1}"),
            "Throughput"
        );

        // Cumulative ratio, evaluated only at timer boundaries:
        // reattempts / writes > 10%
        let summary = state.summary;
        if summary.db_reattempts * 10 > summary.db_writes {
            error!(
                db_writes = summary.db_writes,
                db_reattempts = summary.db_reattempts,
                "Write reattempt ratio exceeded 10%, aborting"
            );
            return Err(AppError::RetryRatioExceeded {
                reattempts: summary.db_reattempts,
                writes: summary.db_writes,
            });
        }

        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
