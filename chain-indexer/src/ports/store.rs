//! Storage port for data persistence.
//!
//! This trait defines the contract for persisting indexed data.
//! Infrastructure adapters implement it using concrete storage backends
//! (PostgreSQL in production, an in-memory store in tests).
//!
//! # Idempotency
//!
//! Every operation is idempotent on its natural key. The committer's
//! one-shot write retry and the concurrent failed-block upserts from the
//! fetch pool and the processor rely on this.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EventBatch, FailureReason, Height, LifecyclePosition, TxBatch};

// ═══════════════════════════════════════════════════════════════════════════════
// DATASETS
// ═══════════════════════════════════════════════════════════════════════════════

/// Row ids produced by [`IndexerStore::index_new_block`], consumed by custom
/// message indexing so artifacts can reference their source rows.
#[derive(Debug, Clone, Default)]
pub struct TxDataset {
    /// Row id of the block record.
    pub block_row_id: i64,
    /// Row id per transaction, aligned with the batch's tx order.
    pub tx_row_ids: Vec<i64>,
    /// Row id per message, keyed by `(tx_index, message_index)`.
    pub message_row_ids: HashMap<(usize, usize), i64>,
}

/// Row ids produced by [`IndexerStore::index_block_events`], consumed by
/// custom block-event indexing.
#[derive(Debug, Clone, Default)]
pub struct EventDataset {
    /// Row id of the block record.
    pub block_row_id: i64,
    /// Row id per event, keyed by `(position, event_index)`.
    pub event_row_ids: HashMap<(LifecyclePosition, usize), i64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER TRACKERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Which registry a parser belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    /// Transaction message parser.
    Message,
    /// Block lifecycle event parser.
    BlockEvent,
}

/// A persisted parser registration.
///
/// Trackers are created once per run so custom-parser artifacts written
/// later can reference a stable row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserTracker {
    /// Database row id of the registration.
    pub row_id: i64,
    /// The parser's stable identifier.
    pub identifier: String,
    /// Which registry the parser belongs to.
    pub kind: ParserKind,
    /// Lifecycle position for block-event parsers.
    pub position: Option<LifecyclePosition>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE PORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Capability set the pipeline needs from the relational store.
#[async_trait]
pub trait IndexerStore: Send + Sync {
    /// Ensure the chain row exists, returning its row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_chain(&self, chain_id: &str, chain_name: &str) -> Result<i64>;

    /// Write a block record and all its transactions in one transaction.
    ///
    /// Must be atomic per block; partial commit is not permitted. Safe to
    /// retry thanks to natural-key upserts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    async fn index_new_block(&self, batch: &TxBatch) -> Result<TxDataset>;

    /// Write all lifecycle events of a block in one transaction.
    ///
    /// With `dry_run` set, performs no writes and returns an empty dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    async fn index_block_events(&self, batch: &EventBatch, dry_run: bool) -> Result<EventDataset>;

    /// Persist custom message-parser artifacts for a committed batch.
    ///
    /// `trackers` maps parser identifiers to their persisted registrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn index_custom_messages(
        &self,
        dataset: &TxDataset,
        batch: &TxBatch,
        trackers: &HashMap<String, ParserTracker>,
    ) -> Result<()>;

    /// Persist custom block-event-parser artifacts for a committed batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn index_custom_block_events(
        &self,
        dataset: &EventDataset,
        batch: &EventBatch,
        trackers: &HashMap<String, ParserTracker>,
    ) -> Result<()>;

    /// Record a height that could not complete its requested work.
    ///
    /// Idempotent on `(chain_id, height)`; may be called concurrently from
    /// the fetch pool and the processor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_failed_block(
        &self,
        height: Height,
        chain_id: &str,
        chain_name: &str,
        reason: FailureReason,
    ) -> Result<()>;

    /// Record a height whose event facet failed.
    ///
    /// Kept separate from [`upsert_failed_block`](Self::upsert_failed_block)
    /// so event-only replays can find their work without scanning reasons.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_failed_event_block(
        &self,
        height: Height,
        chain_id: &str,
        chain_name: &str,
    ) -> Result<()>;

    /// Find or create tracker rows for custom message parsers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_or_create_custom_message_parsers(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, ParserTracker>>;

    /// Find or create tracker rows for custom block-event parsers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_or_create_custom_block_event_parsers(
        &self,
        registrations: &[(String, LifecyclePosition)],
    ) -> Result<HashMap<String, ParserTracker>>;

    /// Run embedder-supplied model migrations once at setup.
    ///
    /// # Errors
    ///
    /// Returns an error if any migration statement fails.
    async fn migrate_custom_models(&self, ddl: &[String]) -> Result<()>;

    /// Heights whose indexed transactions contained the given message type.
    ///
    /// Used to bootstrap reindex-message-type mode before the pipeline
    /// starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn blocks_with_message_type(&self, message_type: &str) -> Result<Vec<Height>>;
}
