//! In-memory implementation of the store port.
//!
//! Backs the end-to-end pipeline tests and local experiments: no database
//! required, every write observable, and write failures injectable to
//! exercise the committer's retry path.
//!
//! Not intended for production use; nothing survives the process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{InfraError, Result};
use crate::ports::{EventDataset, IndexerStore, ParserKind, ParserTracker, TxDataset};
use crate::types::{
    BlockRecord, EventBatch, EventWrapper, FailureReason, Height, LifecyclePosition, TxBatch,
    TxWrapper,
};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Inner {
    chains: HashMap<String, String>,
    blocks: HashMap<u64, BlockRecord>,
    txs: HashMap<u64, Vec<TxWrapper>>,
    events: HashMap<u64, (Vec<EventWrapper>, Vec<EventWrapper>)>,
    failed_blocks: HashMap<u64, FailureReason>,
    failed_event_blocks: HashSet<u64>,
    message_trackers: HashMap<String, ParserTracker>,
    event_trackers: HashMap<String, ParserTracker>,
    message_artifacts: Vec<(String, u64, usize, usize, serde_json::Value)>,
    event_artifacts: Vec<(String, u64, LifecyclePosition, usize, serde_json::Value)>,
    custom_migrations: Vec<String>,
    write_calls: u64,
    next_row_id: i64,
    fail_next_tx_writes: u32,
    fail_next_event_writes: u32,
    tx_write_attempts: u64,
    fail_tx_write_attempts: HashSet<u64>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }
}

/// In-memory store with observable state and injectable write failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ───────────────────────────────────────────────────────────────────────────
    // FAILURE INJECTION
    // ───────────────────────────────────────────────────────────────────────────

    /// Make the next `n` calls to `index_new_block` fail.
    pub fn fail_next_tx_writes(&self, n: u32) {
        self.inner.lock().fail_next_tx_writes = n;
    }

    /// Make the next `n` calls to `index_block_events` fail.
    pub fn fail_next_event_writes(&self, n: u32) {
        self.inner.lock().fail_next_event_writes = n;
    }

    /// Make specific `index_new_block` attempts fail, counted from 1 across
    /// the store's lifetime. Lets tests script "every k-th write needs a
    /// retry" sequences.
    pub fn fail_tx_write_attempts(&self, attempts: &[u64]) {
        self.inner.lock().fail_tx_write_attempts = attempts.iter().copied().collect();
    }

    // ───────────────────────────────────────────────────────────────────────────
    // TEST OBSERVERS
    // ───────────────────────────────────────────────────────────────────────────

    /// The committed block record at a height, if any.
    #[must_use]
    pub fn block(&self, height: u64) -> Option<BlockRecord> {
        self.inner.lock().blocks.get(&height).cloned()
    }

    /// Heights of all committed blocks, sorted.
    #[must_use]
    pub fn block_heights(&self) -> Vec<u64> {
        let mut heights: Vec<_> = self.inner.lock().blocks.keys().copied().collect();
        heights.sort_unstable();
        heights
    }

    /// The committed transactions at a height.
    #[must_use]
    pub fn txs(&self, height: u64) -> Vec<TxWrapper> {
        self.inner.lock().txs.get(&height).cloned().unwrap_or_default()
    }

    /// The committed (begin, end) events at a height.
    #[must_use]
    pub fn events(&self, height: u64) -> Option<(Vec<EventWrapper>, Vec<EventWrapper>)> {
        self.inner.lock().events.get(&height).cloned()
    }

    /// The recorded failure reason for a height, if any.
    #[must_use]
    pub fn failed_block(&self, height: u64) -> Option<FailureReason> {
        self.inner.lock().failed_blocks.get(&height).copied()
    }

    /// Whether the height is recorded in the failed-event bookkeeping.
    #[must_use]
    pub fn failed_event_block(&self, height: u64) -> bool {
        self.inner.lock().failed_event_blocks.contains(&height)
    }

    /// Number of state-mutating store calls so far.
    #[must_use]
    pub fn write_calls(&self) -> u64 {
        self.inner.lock().write_calls
    }

    /// Custom message artifacts recorded so far:
    /// `(parser identifier, height, tx index, message index, value)`.
    #[must_use]
    pub fn message_artifacts(&self) -> Vec<(String, u64, usize, usize, serde_json::Value)> {
        self.inner.lock().message_artifacts.clone()
    }

    /// Custom block-event artifacts recorded so far.
    #[must_use]
    pub fn event_artifacts(
        &self,
    ) -> Vec<(String, u64, LifecyclePosition, usize, serde_json::Value)> {
        self.inner.lock().event_artifacts.clone()
    }

    /// Custom model migration statements executed so far.
    #[must_use]
    pub fn custom_migrations(&self) -> Vec<String> {
        self.inner.lock().custom_migrations.clone()
    }

    /// Message parser trackers created so far.
    #[must_use]
    pub fn message_trackers(&self) -> HashMap<String, ParserTracker> {
        self.inner.lock().message_trackers.clone()
    }

    /// Pre-seed a block with messages, for reindex-mode tests.
    pub fn seed_block_with_message(&self, height: u64, block: BlockRecord, type_url: &str) {
        let mut inner = self.inner.lock();
        inner.blocks.insert(height, block);
        inner.txs.insert(
            height,
            vec![TxWrapper {
                hash: format!("SEED{height}"),
                tx_index: 0,
                code: 0,
                messages: vec![crate::types::MessageWrapper::new(
                    type_url,
                    0,
                    serde_json::Value::Null,
                )],
            }],
        );
    }

    fn injected_failure() -> crate::error::AppError {
        InfraError::Database(sqlx::Error::PoolTimedOut).into()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STORE PORT IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl IndexerStore for InMemoryStore {
    async fn upsert_chain(&self, chain_id: &str, chain_name: &str) -> Result<i64> {
        let mut inner = self.inner.lock();
        inner.write_calls += 1;
        inner
            .chains
            .insert(chain_id.to_owned(), chain_name.to_owned());
        Ok(1)
    }

    async fn index_new_block(&self, batch: &TxBatch) -> Result<TxDataset> {
        let mut inner = self.inner.lock();

        inner.tx_write_attempts += 1;
        if inner.fail_tx_write_attempts.contains(&inner.tx_write_attempts) {
            return Err(Self::injected_failure());
        }
        if inner.fail_next_tx_writes > 0 {
            inner.fail_next_tx_writes -= 1;
            return Err(Self::injected_failure());
        }

        inner.write_calls += 1;

        let height = batch.block.height.value();
        inner.blocks.insert(height, batch.block.clone());
        inner.txs.insert(height, batch.txs.clone());

        let block_row_id = inner.next_id();
        let mut dataset = TxDataset {
            block_row_id,
            ..TxDataset::default()
        };
        for wrapper in &batch.txs {
            let tx_row_id = inner.next_id();
            dataset.tx_row_ids.push(tx_row_id);
            for message in &wrapper.messages {
                let id = inner.next_id();
                dataset
                    .message_row_ids
                    .insert((wrapper.tx_index, message.message_index), id);
            }
        }
        Ok(dataset)
    }

    async fn index_block_events(&self, batch: &EventBatch, dry_run: bool) -> Result<EventDataset> {
        let mut inner = self.inner.lock();

        if inner.fail_next_event_writes > 0 {
            inner.fail_next_event_writes -= 1;
            return Err(Self::injected_failure());
        }

        if dry_run {
            return Ok(EventDataset::default());
        }

        inner.write_calls += 1;

        let height = batch.block.height.value();
        inner.blocks.entry(height).or_insert_with(|| batch.block.clone());
        inner
            .events
            .insert(height, (batch.begin_events.clone(), batch.end_events.clone()));

        let block_row_id = inner.next_id();
        let mut dataset = EventDataset {
            block_row_id,
            ..EventDataset::default()
        };
        for event in batch.begin_events.iter().chain(batch.end_events.iter()) {
            let id = inner.next_id();
            dataset
                .event_row_ids
                .insert((event.position, event.event_index), id);
        }
        Ok(dataset)
    }

    async fn index_custom_messages(
        &self,
        _dataset: &TxDataset,
        batch: &TxBatch,
        trackers: &HashMap<String, ParserTracker>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let height = batch.block.height.value();

        for wrapper in &batch.txs {
            for message in &wrapper.messages {
                for (parser_id, value) in &message.artifacts {
                    if !trackers.contains_key(parser_id) {
                        continue;
                    }
                    inner.write_calls += 1;
                    inner.message_artifacts.push((
                        parser_id.clone(),
                        height,
                        wrapper.tx_index,
                        message.message_index,
                        value.clone(),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn index_custom_block_events(
        &self,
        _dataset: &EventDataset,
        batch: &EventBatch,
        trackers: &HashMap<String, ParserTracker>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let height = batch.block.height.value();

        for event in batch.begin_events.iter().chain(batch.end_events.iter()) {
            for (parser_id, value) in &event.artifacts {
                if !trackers.contains_key(parser_id) {
                    continue;
                }
                inner.write_calls += 1;
                inner.event_artifacts.push((
                    parser_id.clone(),
                    height,
                    event.position,
                    event.event_index,
                    value.clone(),
                ));
            }
        }
        Ok(())
    }

    async fn upsert_failed_block(
        &self,
        height: Height,
        _chain_id: &str,
        _chain_name: &str,
        reason: FailureReason,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.write_calls += 1;
        inner.failed_blocks.insert(height.value(), reason);
        Ok(())
    }

    async fn upsert_failed_event_block(
        &self,
        height: Height,
        _chain_id: &str,
        _chain_name: &str,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.write_calls += 1;
        inner.failed_event_blocks.insert(height.value());
        Ok(())
    }

    async fn find_or_create_custom_message_parsers(
        &self,
        identifiers: &[String],
    ) -> Result<HashMap<String, ParserTracker>> {
        let mut inner = self.inner.lock();
        for identifier in identifiers {
            if !inner.message_trackers.contains_key(identifier) {
                let row_id = inner.next_id();
                inner.message_trackers.insert(
                    identifier.clone(),
                    ParserTracker {
                        row_id,
                        identifier: identifier.clone(),
                        kind: ParserKind::Message,
                        position: None,
                    },
                );
            }
        }
        Ok(inner.message_trackers.clone())
    }

    async fn find_or_create_custom_block_event_parsers(
        &self,
        registrations: &[(String, LifecyclePosition)],
    ) -> Result<HashMap<String, ParserTracker>> {
        let mut inner = self.inner.lock();
        for (identifier, position) in registrations {
            if !inner.event_trackers.contains_key(identifier) {
                let row_id = inner.next_id();
                inner.event_trackers.insert(
                    identifier.clone(),
                    ParserTracker {
                        row_id,
                        identifier: identifier.clone(),
                        kind: ParserKind::BlockEvent,
                        position: Some(*position),
                    },
                );
            }
        }
        Ok(inner.event_trackers.clone())
    }

    async fn migrate_custom_models(&self, ddl: &[String]) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.custom_migrations.extend(ddl.iter().cloned());
        Ok(())
    }

    async fn blocks_with_message_type(&self, message_type: &str) -> Result<Vec<Height>> {
        let inner = self.inner.lock();
        let mut heights: Vec<u64> = inner
            .txs
            .iter()
            .filter(|(_, txs)| {
                txs.iter()
                    .any(|tx| tx.messages.iter().any(|m| m.type_url == message_type))
            })
            .map(|(height, _)| *height)
            .collect();
        heights.sort_unstable();
        Ok(heights.into_iter().map(Height::new).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::MessageWrapper;

    fn block_record(height: u64) -> BlockRecord {
        BlockRecord {
            chain_id: "testchain-1".into(),
            height: Height::new(height),
            timestamp: Utc::now(),
            proposer: "PROP".into(),
            hash: format!("HASH{height}"),
        }
    }

    fn tx_batch(height: u64) -> TxBatch {
        TxBatch {
            block: block_record(height),
            txs: vec![TxWrapper {
                hash: "AA".into(),
                tx_index: 0,
                code: 0,
                messages: vec![MessageWrapper::new(
                    "/bank.v1.MsgSend",
                    0,
                    serde_json::Value::Null,
                )],
            }],
        }
    }

    #[tokio::test]
    async fn index_new_block_is_observable() {
        let store = InMemoryStore::new();
        let dataset = store.index_new_block(&tx_batch(7)).await.unwrap();

        assert!(store.block(7).is_some());
        assert_eq!(store.txs(7).len(), 1);
        assert_eq!(dataset.tx_row_ids.len(), 1);
        assert_eq!(store.write_calls(), 1);
    }

    #[tokio::test]
    async fn injected_failures_consume_themselves() {
        let store = InMemoryStore::new();
        store.fail_next_tx_writes(1);

        assert!(store.index_new_block(&tx_batch(7)).await.is_err());
        assert!(store.index_new_block(&tx_batch(7)).await.is_ok());
    }

    #[tokio::test]
    async fn dry_run_event_write_mutates_nothing() {
        let store = InMemoryStore::new();
        let batch = EventBatch {
            block: block_record(7),
            begin_events: vec![EventWrapper::new(
                "mint",
                vec![],
                LifecyclePosition::Begin,
                0,
            )],
            end_events: vec![],
        };

        store.index_block_events(&batch, true).await.unwrap();
        assert_eq!(store.write_calls(), 0);
        assert!(store.events(7).is_none());
    }

    #[tokio::test]
    async fn trackers_are_stable_across_calls() {
        let store = InMemoryStore::new();
        let first = store
            .find_or_create_custom_message_parsers(&["p1".to_owned()])
            .await
            .unwrap();
        let second = store
            .find_or_create_custom_message_parsers(&["p1".to_owned()])
            .await
            .unwrap();

        assert_eq!(first["p1"].row_id, second["p1"].row_id);
    }

    #[tokio::test]
    async fn reindex_lookup_finds_seeded_blocks() {
        let store = InMemoryStore::new();
        store.seed_block_with_message(5, block_record(5), "/bank.v1.MsgSend");
        store.seed_block_with_message(9, block_record(9), "/gov.v1.MsgVote");

        let heights = store
            .blocks_with_message_type("/bank.v1.MsgSend")
            .await
            .unwrap();
        assert_eq!(heights, vec![Height::new(5)]);
    }
}
