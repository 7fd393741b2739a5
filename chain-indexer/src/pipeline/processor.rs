//! Processor: converts raw bundles into typed batches.
//!
//! Single consumer of the raw channel, sole producer into the two batch
//! channels. For each bundle:
//!
//! 1. Build the canonical [`BlockRecord`]. On failure, record
//!    `UNPROCESSABLE_TX` and move on.
//! 2. Event path (when requested and fetched): wrap the begin/end events,
//!    run custom block-event parsers, apply the filter registries. Any
//!    parse failure records `FAILED_EVENT_HANDLING` and drops only the
//!    event batch.
//! 3. Tx path (when requested and fetched): decode transactions, apply
//!    message type filters, run custom message parsers. Any parse failure
//!    records `UNPROCESSABLE_TX` and drops only the tx batch.
//!
//! The two facets of one height fail independently.
//!
//! When the raw channel closes and drains, returning from `run` drops both
//! batch senders, closing the downstream channels.

use std::sync::Arc;

use comet_rpc::types::AbciEvent;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::config::Settings;
use crate::error::{DomainError, Result};
use crate::parsers::{ParserRegistry, TxDecoder};
use crate::ports::IndexerStore;
use crate::types::{
    BlockRecord, EventBatch, EventWrapper, FailureReason, LifecyclePosition, RawBundle, TxBatch,
    TxWrapper,
};

// ═══════════════════════════════════════════════════════════════════════════════
// PROCESSOR
// ═══════════════════════════════════════════════════════════════════════════════

/// Converts raw bundles to typed batches, applying registries and filters.
pub struct Processor {
    settings: Arc<Settings>,
    registry: Arc<ParserRegistry>,
    decoder: Arc<dyn TxDecoder>,
    store: Arc<dyn IndexerStore>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("registry", &self.registry)
            .finish()
    }
}

impl Processor {
    /// Create a processor.
    pub fn new(
        settings: Arc<Settings>,
        registry: Arc<ParserRegistry>,
        decoder: Arc<dyn TxDecoder>,
        store: Arc<dyn IndexerStore>,
    ) -> Self {
        Self {
            settings,
            registry,
            decoder,
            store,
        }
    }

    /// Drain the raw channel, then close both batch channels by returning.
    ///
    /// # Errors
    ///
    /// Returns an error only when failed-block bookkeeping cannot reach the
    /// store.
    #[instrument(skip_all)]
    pub async fn run(
        self,
        mut raw: mpsc::Receiver<RawBundle>,
        tx_batches: mpsc::Sender<TxBatch>,
        event_batches: mpsc::Sender<EventBatch>,
    ) -> Result<()> {
        while let Some(bundle) = raw.recv().await {
            if !self.process(bundle, &tx_batches, &event_batches).await? {
                debug!("Batch channel closed downstream, processor exiting");
                break;
            }
        }
        Ok(())
    }

    /// Process one bundle. Returns `false` when a downstream channel closed.
    async fn process(
        &self,
        bundle: RawBundle,
        tx_batches: &mpsc::Sender<TxBatch>,
        event_batches: &mpsc::Sender<EventBatch>,
    ) -> Result<bool> {
        let height = bundle.height;
        let chain = &self.settings.chain;

        let block = match self.build_block_record(&bundle) {
            Ok(block) => block,
            Err(e) => {
                warn!(%height, error = %e, "Block record build failed");
                self.store
                    .upsert_failed_block(
                        height,
                        &chain.chain_id,
                        &chain.chain_name,
                        FailureReason::UnprocessableTx,
                    )
                    .await?;
                return Ok(true);
            }
        };

        let tx_path_active = bundle.index_txs && !bundle.tx_fetch_failed;

        // Event path
        if bundle.index_events && !bundle.event_fetch_failed {
            match self.build_event_batch(&bundle, &block) {
                Ok(batch) => {
                    // An all-empty batch is only worth committing when the tx
                    // path will not write the block record itself.
                    if !batch.is_empty() || !tx_path_active {
                        if event_batches.send(batch).await.is_err() {
                            return Ok(false);
                        }
                    }
                }
                Err(e) => {
                    warn!(%height, error = %e, "Event handling failed, dropping event batch");
                    self.store
                        .upsert_failed_event_block(height, &chain.chain_id, &chain.chain_name)
                        .await?;
                    self.store
                        .upsert_failed_block(
                            height,
                            &chain.chain_id,
                            &chain.chain_name,
                            FailureReason::FailedEventHandling,
                        )
                        .await?;
                }
            }
        }

        // Tx path
        if tx_path_active {
            match self.build_tx_batch(&bundle, &block) {
                Ok(batch) => {
                    if tx_batches.send(batch).await.is_err() {
                        return Ok(false);
                    }
                }
                Err(e) => {
                    warn!(%height, error = %e, "Tx parsing failed, dropping tx batch");
                    self.store
                        .upsert_failed_block(
                            height,
                            &chain.chain_id,
                            &chain.chain_name,
                            FailureReason::UnprocessableTx,
                        )
                        .await?;
                }
            }
        }

        Ok(true)
    }

    /// Canonicalize the block header, sanity-checking the height.
    fn build_block_record(&self, bundle: &RawBundle) -> std::result::Result<BlockRecord, DomainError> {
        let record = BlockRecord::from_response(&bundle.block);
        if record.height != bundle.height {
            return Err(DomainError::HeightMismatch {
                requested: bundle.height.value(),
                returned: record.height.value(),
            });
        }
        if let Some(results) = &bundle.results {
            if results.height != bundle.height.value() {
                return Err(DomainError::HeightMismatch {
                    requested: bundle.height.value(),
                    returned: results.height,
                });
            }
        }
        Ok(record)
    }

    /// Wrap, custom-parse and filter the lifecycle events of a bundle.
    fn build_event_batch(
        &self,
        bundle: &RawBundle,
        block: &BlockRecord,
    ) -> std::result::Result<EventBatch, DomainError> {
        let results = bundle.results.as_ref().ok_or_else(|| DomainError::EventParse {
            event_type: "<none>".into(),
            reason: "bundle carries no block results".into(),
        })?;

        let begin = self.wrap_events(results.begin_events(), LifecyclePosition::Begin, block)?;
        let end = self.wrap_events(results.end_events(), LifecyclePosition::End, block)?;

        let begin = self.registry.begin_block_filter_registry().filter(begin);
        let end = self.registry.end_block_filter_registry().filter(end);

        Ok(EventBatch {
            block: block.clone(),
            begin_events: begin,
            end_events: end,
        })
    }

    /// Wrap one lifecycle section and run its custom parsers.
    fn wrap_events(
        &self,
        events: &[AbciEvent],
        position: LifecyclePosition,
        block: &BlockRecord,
    ) -> std::result::Result<Vec<EventWrapper>, DomainError> {
        events
            .iter()
            .enumerate()
            .map(|(event_index, event)| {
                let attributes = event
                    .attributes
                    .iter()
                    .map(|a| (a.key.clone(), a.value.clone()))
                    .collect();
                let mut wrapper = EventWrapper::new(event.kind.clone(), attributes, position, event_index);

                for parser in self.registry.block_event_parsers(position, &wrapper.kind) {
                    if let Some(artifact) = parser.parse(&wrapper, block)? {
                        wrapper
                            .artifacts
                            .insert(parser.identifier().to_owned(), artifact);
                    }
                }
                Ok(wrapper)
            })
            .collect()
    }

    /// Decode, filter and custom-parse the transactions of a bundle.
    fn build_tx_batch(
        &self,
        bundle: &RawBundle,
        block: &BlockRecord,
    ) -> std::result::Result<TxBatch, DomainError> {
        let decoded = self.decoder.decode(bundle)?;

        let txs = decoded
            .into_iter()
            .map(|tx| {
                let mut messages = Vec::with_capacity(tx.messages.len());
                for mut message in tx.messages {
                    if !self.registry.should_index_message(&message.type_url) {
                        debug!(
                            type_url = %message.type_url,
                            height = %block.height,
                            "Message rejected by type filters"
                        );
                        continue;
                    }
                    for parser in self.registry.message_parsers(&message.type_url) {
                        if let Some(artifact) = parser.parse(&message, block)? {
                            message
                                .artifacts
                                .insert(parser.identifier().to_owned(), artifact);
                        }
                    }
                    messages.push(message);
                }
                Ok(TxWrapper {
                    hash: tx.hash,
                    tx_index: tx.tx_index,
                    code: tx.code,
                    messages,
                })
            })
            .collect::<std::result::Result<Vec<_>, DomainError>>()?;

        Ok(TxBatch {
            block: block.clone(),
            txs,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use comet_rpc::types::{BlockResultsResponse, TxSearchResponse};

    use super::*;
    use crate::parsers::{EventDerivedDecoder, MessageParser};
    use crate::pipeline::testing::{
        abci_event, empty_block, empty_results, message_event, test_settings, tx_info,
    };
    use crate::store::InMemoryStore;
    use crate::types::{Height, MessageWrapper};

    fn bundle_at(height: u64) -> RawBundle {
        RawBundle {
            height: Height::new(height),
            block: empty_block(height),
            results: Some(empty_results(height)),
            tx_search: Some(TxSearchResponse::default()),
            index_txs: true,
            index_events: true,
            tx_fetch_failed: false,
            event_fetch_failed: false,
        }
    }

    fn processor(registry: Arc<ParserRegistry>, store: InMemoryStore) -> Processor {
        Processor::new(
            Arc::new(test_settings()),
            registry,
            Arc::new(EventDerivedDecoder),
            Arc::new(store),
        )
    }

    async fn run_one(
        proc: Processor,
        bundle: RawBundle,
    ) -> (Vec<TxBatch>, Vec<EventBatch>) {
        let (raw_tx, raw_rx) = mpsc::channel(4);
        let (txb_tx, mut txb_rx) = mpsc::channel(4);
        let (evb_tx, mut evb_rx) = mpsc::channel(4);

        raw_tx.send(bundle).await.unwrap();
        drop(raw_tx);
        proc.run(raw_rx, txb_tx, evb_tx).await.unwrap();

        let mut tx_batches = Vec::new();
        while let Some(b) = txb_rx.recv().await {
            tx_batches.push(b);
        }
        let mut event_batches = Vec::new();
        while let Some(b) = evb_rx.recv().await {
            event_batches.push(b);
        }
        (tx_batches, event_batches)
    }

    fn empty_registry() -> Arc<ParserRegistry> {
        Arc::new(ParserRegistry::builder().build())
    }

    #[tokio::test]
    async fn empty_height_emits_block_record_only() {
        let store = InMemoryStore::new();
        let proc = processor(empty_registry(), store);

        let (tx_batches, event_batches) = run_one(proc, bundle_at(1)).await;

        assert_eq!(tx_batches.len(), 1, "block record travels in the tx batch");
        assert!(tx_batches[0].txs.is_empty());
        assert!(event_batches.is_empty(), "empty event batch not emitted");
    }

    #[tokio::test]
    async fn txs_and_events_both_emitted() {
        let store = InMemoryStore::new();
        let proc = processor(empty_registry(), store);

        let mut bundle = bundle_at(1);
        bundle.tx_search = Some(TxSearchResponse {
            total_count: 1,
            txs: vec![tx_info(
                "AAAA",
                1,
                0,
                vec![
                    message_event("/bank.v1.MsgSend", 0),
                    message_event("/staking.v1.MsgDelegate", 1),
                ],
            )],
        });
        bundle.results = Some(BlockResultsResponse {
            height: 1,
            txs_results: None,
            begin_block_events: Some(vec![abci_event("mint", &[("amount", "5")])]),
            end_block_events: Some(vec![abci_event("validator_update", &[])]),
        });

        let (tx_batches, event_batches) = run_one(proc, bundle).await;

        assert_eq!(tx_batches[0].txs[0].messages.len(), 2);
        assert_eq!(event_batches.len(), 1);
        assert_eq!(event_batches[0].begin_events.len(), 1);
        assert_eq!(event_batches[0].end_events.len(), 1);
        assert_eq!(event_batches[0].begin_events[0].kind, "mint");
    }

    #[tokio::test]
    async fn tx_parse_failure_keeps_event_facet() {
        let store = InMemoryStore::new();
        let proc = processor(empty_registry(), store.clone());

        let mut bundle = bundle_at(1);
        // Malformed msg_index poisons tx decoding
        bundle.tx_search = Some(TxSearchResponse {
            total_count: 1,
            txs: vec![tx_info(
                "AAAA",
                1,
                0,
                vec![abci_event(
                    "message",
                    &[("action", "/bank.v1.MsgSend"), ("msg_index", "bogus")],
                )],
            )],
        });
        bundle.results = Some(BlockResultsResponse {
            height: 1,
            txs_results: None,
            begin_block_events: Some(vec![abci_event("mint", &[])]),
            end_block_events: None,
        });

        let (tx_batches, event_batches) = run_one(proc, bundle).await;

        assert!(tx_batches.is_empty(), "tx batch dropped");
        assert_eq!(event_batches.len(), 1, "event facet unaffected");
        assert_eq!(
            store.failed_block(1),
            Some(FailureReason::UnprocessableTx)
        );
    }

    #[tokio::test]
    async fn event_parser_failure_keeps_tx_facet() {
        #[derive(Debug)]
        struct FailingEventParser;

        impl crate::parsers::BlockEventParser for FailingEventParser {
            fn identifier(&self) -> &str {
                "failing-event-parser"
            }

            fn parse(
                &self,
                event: &EventWrapper,
                _block: &BlockRecord,
            ) -> std::result::Result<Option<serde_json::Value>, DomainError> {
                Err(DomainError::EventParse {
                    event_type: event.kind.clone(),
                    reason: "scripted".into(),
                })
            }
        }

        let registry = ParserRegistry::builder()
            .register_block_event_parser(
                LifecyclePosition::Begin,
                "mint",
                Arc::new(FailingEventParser),
            )
            .unwrap()
            .build();

        let store = InMemoryStore::new();
        let proc = processor(Arc::new(registry), store.clone());

        let mut bundle = bundle_at(1);
        bundle.results = Some(BlockResultsResponse {
            height: 1,
            txs_results: None,
            begin_block_events: Some(vec![abci_event("mint", &[])]),
            end_block_events: None,
        });

        let (tx_batches, event_batches) = run_one(proc, bundle).await;

        assert!(event_batches.is_empty(), "event batch dropped");
        assert_eq!(tx_batches.len(), 1, "tx facet unaffected");
        assert!(store.failed_event_block(1));
        assert_eq!(
            store.failed_block(1),
            Some(FailureReason::FailedEventHandling)
        );
    }

    #[tokio::test]
    async fn message_type_filter_drops_messages() {
        let registry = ParserRegistry::builder()
            .register_message_type_filter(Arc::new(crate::parsers::MessageTypeAllowlist::new([
                "/bank.v1.MsgSend",
            ])))
            .build();

        let store = InMemoryStore::new();
        let proc = processor(Arc::new(registry), store);

        let mut bundle = bundle_at(1);
        bundle.tx_search = Some(TxSearchResponse {
            total_count: 1,
            txs: vec![tx_info(
                "AAAA",
                1,
                0,
                vec![
                    message_event("/bank.v1.MsgSend", 0),
                    message_event("/gov.v1.MsgVote", 1),
                ],
            )],
        });

        let (tx_batches, _) = run_one(proc, bundle).await;

        let messages = &tx_batches[0].txs[0].messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].type_url, "/bank.v1.MsgSend");
    }

    #[tokio::test]
    async fn custom_message_parser_attaches_artifact() {
        #[derive(Debug)]
        struct TaggingParser;

        impl MessageParser for TaggingParser {
            fn identifier(&self) -> &str {
                "tagging-parser"
            }

            fn parse(
                &self,
                message: &MessageWrapper,
                block: &BlockRecord,
            ) -> std::result::Result<Option<serde_json::Value>, DomainError> {
                Ok(Some(serde_json::json!({
                    "type": message.type_url,
                    "height": block.height.value(),
                })))
            }
        }

        let registry = ParserRegistry::builder()
            .register_message_parser("/x.foo.v1.MsgBar", Arc::new(TaggingParser))
            .unwrap()
            .build();

        let store = InMemoryStore::new();
        let proc = processor(Arc::new(registry), store);

        let mut bundle = bundle_at(1);
        bundle.tx_search = Some(TxSearchResponse {
            total_count: 1,
            txs: vec![tx_info(
                "AAAA",
                1,
                0,
                vec![message_event("/x.foo.v1.MsgBar", 0)],
            )],
        });

        let (tx_batches, _) = run_one(proc, bundle).await;

        let artifact = tx_batches[0].txs[0].messages[0]
            .artifacts
            .get("tagging-parser")
            .unwrap();
        assert_eq!(artifact["height"], 1);
    }

    #[tokio::test]
    async fn height_mismatch_is_unprocessable() {
        let store = InMemoryStore::new();
        let proc = processor(empty_registry(), store.clone());

        let mut bundle = bundle_at(1);
        bundle.block = empty_block(2); // node returned the wrong block

        let (tx_batches, event_batches) = run_one(proc, bundle).await;

        assert!(tx_batches.is_empty());
        assert!(event_batches.is_empty());
        assert_eq!(store.failed_block(1), Some(FailureReason::UnprocessableTx));
    }

    #[tokio::test]
    async fn fetch_failed_facets_are_skipped() {
        let store = InMemoryStore::new();
        let proc = processor(empty_registry(), store);

        let mut bundle = bundle_at(1);
        bundle.event_fetch_failed = true;
        bundle.results = None;

        let (tx_batches, event_batches) = run_one(proc, bundle).await;

        // Tx path still ran (tx_search source), event path skipped
        assert_eq!(tx_batches.len(), 1);
        assert!(event_batches.is_empty());
    }
}
