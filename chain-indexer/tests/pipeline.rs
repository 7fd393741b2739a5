//! End-to-end pipeline tests against a scripted node and an in-memory
//! store: the full topology from enqueue to commit, no network, no
//! database.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use async_trait::async_trait;
use comet_rpc::types::{BlockResultsResponse, TxSearchResponse};
use tokio::sync::mpsc;

use chain_indexer::error::{AppError, Result};
use chain_indexer::parsers::MessageParser;
use chain_indexer::pipeline::testing::{
    abci_event, message_event, test_settings, tx_info, ScriptedNode,
};
use chain_indexer::pipeline::{EnqueueSource, Pipeline, PipelineBuilder, PipelineConfig};
use chain_indexer::store::InMemoryStore;
use chain_indexer::types::{
    BlockRecord, EnqueueJob, FailureReason, Height, MessageWrapper,
};

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn pipeline_for_range(
    node: &ScriptedNode,
    store: &InMemoryStore,
    start: u64,
    end: u64,
    config: PipelineConfig,
) -> Pipeline {
    let mut settings = test_settings();
    settings.indexer.start_block = start;
    settings.indexer.end_block = Some(end);
    Pipeline::new(
        settings,
        Arc::new(node.clone()),
        Arc::new(store.clone()),
        config,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// SPEC SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════════

/// Scenario 1: single block, happy path.
#[tokio::test]
async fn single_block_happy_path() {
    let node = ScriptedNode::with_empty_blocks(100..=100);
    node.put_tx_search(
        100,
        TxSearchResponse {
            total_count: 1,
            txs: vec![tx_info(
                "AAAA",
                100,
                0,
                vec![
                    message_event("/cosmos.bank.v1beta1.MsgSend", 0),
                    message_event("/cosmos.staking.v1beta1.MsgDelegate", 1),
                ],
            )],
        },
    );
    node.put_results(
        100,
        BlockResultsResponse {
            height: 100,
            txs_results: None,
            begin_block_events: Some(vec![abci_event("mint", &[("amount", "5")])]),
            end_block_events: Some(vec![abci_event("validator_update", &[])]),
        },
    );

    let store = InMemoryStore::new();
    let pipeline = pipeline_for_range(&node, &store, 100, 100, PipelineConfig::default());
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.blocks_indexed, 1);
    assert!(store.block(100).is_some());

    let txs = store.txs(100);
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].messages.len(), 2);

    let (begin, end) = store.events(100).unwrap();
    assert_eq!(begin.len(), 1);
    assert_eq!(end.len(), 1);

    assert!(store.failed_block(100).is_none());
    assert!(!store.failed_event_block(100));
}

/// Scenario 2: block fetch failure.
#[tokio::test]
async fn fetch_failure_records_and_drops() {
    let node = ScriptedNode::with_empty_blocks(200..=200);
    node.fail_block_at(200);

    let store = InMemoryStore::new();
    let pipeline = pipeline_for_range(&node, &store, 200, 200, PipelineConfig::default());
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.blocks_indexed, 0);
    assert!(store.block(200).is_none());
    assert!(store.events(200).is_none());
    assert_eq!(store.failed_block(200), Some(FailureReason::FetchFailed));
}

/// Scenario 3: tx parse fails, events succeed.
#[tokio::test]
async fn tx_parse_failure_keeps_events() {
    let node = ScriptedNode::with_empty_blocks(300..=300);
    // Malformed msg_index poisons tx decoding
    node.put_tx_search(
        300,
        TxSearchResponse {
            total_count: 1,
            txs: vec![tx_info(
                "AAAA",
                300,
                0,
                vec![abci_event(
                    "message",
                    &[("action", "/cosmos.bank.v1beta1.MsgSend"), ("msg_index", "bogus")],
                )],
            )],
        },
    );
    node.put_results(
        300,
        BlockResultsResponse {
            height: 300,
            txs_results: None,
            begin_block_events: Some(vec![abci_event("mint", &[])]),
            end_block_events: None,
        },
    );

    let store = InMemoryStore::new();
    let pipeline = pipeline_for_range(&node, &store, 300, 300, PipelineConfig::default());
    pipeline.run().await.unwrap();

    assert!(store.block(300).is_some(), "block written via event batch");
    assert!(store.events(300).is_some(), "event facet committed");
    assert!(store.txs(300).is_empty(), "tx batch dropped");
    assert_eq!(
        store.failed_block(300),
        Some(FailureReason::UnprocessableTx)
    );
}

/// Scenario 4: first write fails, retry succeeds.
#[tokio::test]
async fn store_retry_succeeds() {
    let node = ScriptedNode::with_empty_blocks(1..=1);
    let store = InMemoryStore::new();
    store.fail_next_tx_writes(1);

    let pipeline = pipeline_for_range(&node, &store, 1, 1, PipelineConfig::default());
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.db_reattempts, 1);
    assert!(store.block(1).is_some());
}

/// Scenario 5: reattempt ratio breach at the block-timer tick is fatal.
#[tokio::test]
async fn retry_ratio_breach_is_fatal() {
    let node = ScriptedNode::with_empty_blocks(1..=10);
    let store = InMemoryStore::new();
    // Two write attempts fail (batches retry successfully), giving
    // 2 reattempts over 10 writes = 20% at the 10th block
    store.fail_tx_write_attempts(&[3, 8]);

    let mut settings = test_settings();
    settings.indexer.start_block = 1;
    settings.indexer.end_block = Some(10);
    settings.indexer.block_timer = 10;
    settings.indexer.index_block_events = false;

    let pipeline = Pipeline::new(
        settings,
        Arc::new(node),
        Arc::new(store),
        PipelineConfig::default(),
    );
    let result = pipeline.run().await;

    assert!(matches!(
        result,
        Err(AppError::RetryRatioExceeded { reattempts: 2, writes: 10 })
    ));
}

/// Scenario 6: custom message parser artifacts reach the store keyed by
/// the parser identifier.
#[tokio::test]
async fn custom_message_parser_artifacts_are_persisted() {
    #[derive(Debug)]
    struct BarParser;

    impl MessageParser for BarParser {
        fn identifier(&self) -> &str {
            "bar-parser"
        }

        fn parse(
            &self,
            message: &MessageWrapper,
            block: &BlockRecord,
        ) -> std::result::Result<Option<serde_json::Value>, chain_indexer::error::DomainError>
        {
            Ok(Some(serde_json::json!({
                "seen": message.type_url,
                "height": block.height.value(),
            })))
        }
    }

    let node = ScriptedNode::with_empty_blocks(100..=100);
    node.put_tx_search(
        100,
        TxSearchResponse {
            total_count: 1,
            txs: vec![tx_info(
                "AAAA",
                100,
                0,
                vec![message_event("/x.foo.v1.MsgBar", 0)],
            )],
        },
    );

    let store = InMemoryStore::new();
    let config = PipelineBuilder::new()
        .register_message_parser("/x.foo.v1.MsgBar", Arc::new(BarParser))
        .unwrap()
        .build();

    let pipeline = pipeline_for_range(&node, &store, 100, 100, config);
    pipeline.run().await.unwrap();

    // The tx wrapper carries the artifact keyed by the parser identifier
    let txs = store.txs(100);
    assert!(txs[0].messages[0].artifacts.contains_key("bar-parser"));

    // A tracker row was created and the artifact was indexed against it
    assert!(store.message_trackers().contains_key("bar-parser"));
    let artifacts = store.message_artifacts();
    assert_eq!(artifacts.len(), 1);
    let (parser_id, height, tx_index, message_index, value) = &artifacts[0];
    assert_eq!(parser_id, "bar-parser");
    assert_eq!(*height, 100);
    assert_eq!((*tx_index, *message_index), (0, 0));
    assert_eq!(value["height"], 100);
}

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Invariant 1: after a drain, every enqueued height is committed or
/// recorded as failed.
#[tokio::test]
async fn every_height_commits_or_fails() {
    let node = ScriptedNode::with_empty_blocks(1..=20);
    node.fail_block_at(4);
    node.fail_block_at(11);
    node.fail_results_at(7);

    let store = InMemoryStore::new();
    let pipeline = pipeline_for_range(&node, &store, 1, 20, PipelineConfig::default());
    pipeline.run().await.unwrap();

    for height in 1..=20u64 {
        let committed = store.block(height).is_some();
        let failed = store.failed_block(height).is_some();
        assert!(
            committed || failed,
            "height {height} neither committed nor recorded as failed"
        );
    }
    // The heights with scripted block failures must not have block records
    assert!(store.block(4).is_none());
    assert!(store.block(11).is_none());
    // A partial (event fetch) failure still commits the tx facet and keeps
    // a failure record
    assert!(store.block(7).is_some());
    assert_eq!(store.failed_block(7), Some(FailureReason::FetchFailed));
}

/// Invariant 7: worker counts do not change the indexed output.
#[tokio::test]
async fn worker_count_does_not_change_output() {
    fn scripted_chain() -> ScriptedNode {
        let node = ScriptedNode::with_empty_blocks(1..=30);
        for height in [3u64, 9, 17, 25] {
            node.put_tx_search(
                height,
                TxSearchResponse {
                    total_count: 1,
                    txs: vec![tx_info(
                        &format!("TX{height}"),
                        height,
                        0,
                        vec![message_event("/cosmos.bank.v1beta1.MsgSend", 0)],
                    )],
                },
            );
        }
        node.fail_block_at(13);
        node
    }

    async fn run_with_workers(workers: usize) -> InMemoryStore {
        let store = InMemoryStore::new();
        let mut settings = test_settings();
        settings.indexer.start_block = 1;
        settings.indexer.end_block = Some(30);
        settings.rpc.workers = workers;

        let pipeline = Pipeline::new(
            settings,
            Arc::new(scripted_chain()),
            Arc::new(store.clone()),
            PipelineConfig::default(),
        );
        pipeline.run().await.unwrap();
        store
    }

    let single = run_with_workers(1).await;
    let many = run_with_workers(8).await;

    assert_eq!(single.block_heights(), many.block_heights());
    for height in single.block_heights() {
        assert_eq!(
            single.txs(height).len(),
            many.txs(height).len(),
            "tx count differs at height {height}"
        );
    }
    assert_eq!(
        single.failed_block(13),
        many.failed_block(13),
        "failure bookkeeping differs"
    );
}

/// Property 4: dry run writes nothing but reports the same counters.
#[tokio::test]
async fn dry_run_counters_match_real_run() {
    fn scripted_chain() -> ScriptedNode {
        let node = ScriptedNode::with_empty_blocks(1..=10);
        node.put_results(
            5,
            BlockResultsResponse {
                height: 5,
                txs_results: None,
                begin_block_events: Some(vec![abci_event("mint", &[])]),
                end_block_events: None,
            },
        );
        node
    }

    async fn run(dry_run: bool) -> (chain_indexer::pipeline::PipelineSummary, InMemoryStore) {
        let store = InMemoryStore::new();
        let mut settings = test_settings();
        settings.indexer.start_block = 1;
        settings.indexer.end_block = Some(10);
        settings.indexer.dry_run = dry_run;

        let pipeline = Pipeline::new(
            settings,
            Arc::new(scripted_chain()),
            Arc::new(store.clone()),
            PipelineConfig::default(),
        );
        let summary = pipeline.run().await.unwrap();
        (summary, store)
    }

    let (real_summary, real_store) = run(false).await;
    let (dry_summary, dry_store) = run(true).await;

    assert_eq!(real_summary, dry_summary, "counters must match");
    assert!(real_store.write_calls() > 0);
    assert_eq!(dry_store.write_calls(), 0, "dry run performs zero writes");
    assert!(dry_store.block_heights().is_empty());
}

/// Boundary case: a height with zero transactions and zero events yields a
/// block record only.
#[tokio::test]
async fn empty_height_yields_block_record_only() {
    let node = ScriptedNode::with_empty_blocks(50..=50);
    let store = InMemoryStore::new();

    let pipeline = pipeline_for_range(&node, &store, 50, 50, PipelineConfig::default());
    pipeline.run().await.unwrap();

    assert!(store.block(50).is_some());
    assert!(store.txs(50).is_empty());
    assert!(store.events(50).is_none());
    assert!(store.failed_block(50).is_none());
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXTENSION SURFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// A custom enqueue source supersedes mode selection.
#[tokio::test]
async fn custom_enqueue_source_overrides_modes() {
    struct PickedHeights(Vec<u64>);

    #[async_trait]
    impl EnqueueSource for PickedHeights {
        async fn run(self: Box<Self>, jobs: mpsc::Sender<EnqueueJob>) -> Result<()> {
            for height in self.0 {
                if jobs
                    .send(EnqueueJob::full(Height::new(height)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(())
        }
    }

    let node = ScriptedNode::with_empty_blocks(1..=10);
    let store = InMemoryStore::new();

    // Default mode would walk 1..=10; the custom source picks 2 and 7
    let config = PipelineBuilder::new()
        .with_enqueue_source(Box::new(PickedHeights(vec![2, 7])))
        .build();

    let pipeline = pipeline_for_range(&node, &store, 1, 10, config);
    pipeline.run().await.unwrap();

    assert_eq!(store.block_heights(), vec![2, 7]);
}

/// Custom model migrations run once at setup.
#[tokio::test]
async fn custom_migrations_run_at_setup() {
    let node = ScriptedNode::with_empty_blocks(1..=1);
    let store = InMemoryStore::new();

    let config = PipelineBuilder::new()
        .register_custom_migration("CREATE TABLE IF NOT EXISTS my_model (id BIGINT)")
        .build();

    let pipeline = pipeline_for_range(&node, &store, 1, 1, config);
    pipeline.run().await.unwrap();

    assert_eq!(
        store.custom_migrations(),
        vec!["CREATE TABLE IF NOT EXISTS my_model (id BIGINT)".to_owned()]
    );
}

/// Filter-file event filters apply end to end.
#[tokio::test]
async fn filter_file_filters_events_end_to_end() {
    let node = ScriptedNode::with_empty_blocks(1..=1);
    node.put_results(
        1,
        BlockResultsResponse {
            height: 1,
            txs_results: None,
            begin_block_events: Some(vec![
                abci_event("mint", &[]),
                abci_event("transfer", &[]),
                abci_event("burn", &[]),
            ]),
            end_block_events: None,
        },
    );

    let file: chain_indexer::parsers::FilterFile = serde_json::from_str(
        r#"{"beginBlockEventFilters": [{"eventType": "transfer"}]}"#,
    )
    .unwrap();

    let store = InMemoryStore::new();
    let config = PipelineBuilder::new().with_filter_file(&file).build();
    let pipeline = pipeline_for_range(&node, &store, 1, 1, config);
    pipeline.run().await.unwrap();

    let (begin, end) = store.events(1).unwrap();
    assert_eq!(begin.len(), 1);
    assert_eq!(begin[0].kind, "transfer");
    assert!(end.is_empty());
}
