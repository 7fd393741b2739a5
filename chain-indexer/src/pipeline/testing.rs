//! Scripted collaborators for pipeline tests.
//!
//! [`ScriptedNode`] is a [`NodeClient`] with programmable per-height
//! responses and failure injection, letting the end-to-end suites run the
//! whole pipeline without a network. Paired with
//! [`InMemoryStore`](crate::store::InMemoryStore) it covers every spec
//! scenario.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use comet_rpc::types::{
    AbciEvent, Block, BlockData, BlockId, BlockResponse, BlockResultsResponse, EventAttribute,
    Header, NodeInfo, Status, SyncInfo, TxInfo, TxResult, TxSearchResponse,
};
use parking_lot::Mutex;

use crate::config::{
    ChainSettings, DatabaseSettings, IndexerSettings, LoggingSettings, RpcSettings, Settings,
};
use crate::error::{AppError, InfraError, Result};
use crate::ports::NodeClient;
use crate::types::Height;

/// Chain id used by every scripted fixture.
pub const TEST_CHAIN_ID: &str = "testchain-1";

// ═══════════════════════════════════════════════════════════════════════════════
// SETTINGS FIXTURE
// ═══════════════════════════════════════════════════════════════════════════════

/// Valid settings for pipeline tests: one worker, finite range, no timers.
#[must_use]
pub fn test_settings() -> Settings {
    Settings {
        chain: ChainSettings {
            chain_id: TEST_CHAIN_ID.into(),
            chain_name: "testchain".into(),
            account_prefix: "cosmos".into(),
        },
        rpc: RpcSettings {
            url: "http://localhost:26657".into(),
            workers: 1,
            poll_interval_ms: 10,
            request_timeout_ms: 5000,
            tx_page_size: 100,
        },
        database: DatabaseSettings {
            url: "postgres://localhost/test".into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout_ms: 5000,
            idle_timeout_ms: 600_000,
        },
        indexer: IndexerSettings {
            start_block: 1,
            end_block: Some(1),
            block_input_file: None,
            reindex_message_type: None,
            filter_file: None,
            dry_run: false,
            block_timer: 0,
            index_transactions: true,
            index_block_events: true,
            wait_for_chain: false,
            wait_for_chain_delay_secs: 0,
        },
        logging: LoggingSettings {
            level: "info".into(),
            pretty: false,
            file_path: None,
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT / TX FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

/// Build an ABCI event from key/value attribute pairs.
#[must_use]
pub fn abci_event(kind: &str, attributes: &[(&str, &str)]) -> AbciEvent {
    AbciEvent {
        kind: kind.into(),
        attributes: attributes
            .iter()
            .map(|(k, v)| EventAttribute::new(*k, *v))
            .collect(),
    }
}

/// A `message` event announcing one message of a tx.
#[must_use]
pub fn message_event(action: &str, msg_index: usize) -> AbciEvent {
    abci_event(
        "message",
        &[("action", action), ("msg_index", &msg_index.to_string())],
    )
}

/// A committed transaction carrying the given events.
#[must_use]
pub fn tx_info(hash: &str, height: u64, index: u32, events: Vec<AbciEvent>) -> TxInfo {
    TxInfo {
        hash: hash.into(),
        height,
        index,
        tx_result: TxResult {
            code: 0,
            events,
            ..TxResult::default()
        },
        tx: String::new(),
    }
}

/// An empty block response at a height.
#[must_use]
pub fn empty_block(height: u64) -> BlockResponse {
    BlockResponse {
        block_id: BlockId {
            hash: format!("HASH{height}"),
        },
        block: Block {
            header: Header {
                chain_id: TEST_CHAIN_ID.into(),
                height,
                time: Utc::now(),
                proposer_address: format!("PROP{height}"),
            },
            data: BlockData::default(),
        },
    }
}

/// Empty block results at a height.
#[must_use]
pub fn empty_results(height: u64) -> BlockResultsResponse {
    BlockResultsResponse {
        height,
        txs_results: None,
        begin_block_events: None,
        end_block_events: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTED NODE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Script {
    blocks: HashMap<u64, BlockResponse>,
    results: HashMap<u64, BlockResultsResponse>,
    tx_search: HashMap<u64, TxSearchResponse>,
    fail_block: HashSet<u64>,
    fail_results: HashSet<u64>,
    fail_tx_search: HashSet<u64>,
    catching_up_polls: u32,
}

/// Node client with programmable per-height responses.
///
/// Clone handles share the script, so a test can keep mutating responses
/// after handing the node to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ScriptedNode {
    script: Arc<Mutex<Script>>,
}

impl ScriptedNode {
    /// Create an empty scripted node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A node serving empty blocks (no txs, no events) for every height in
    /// the range.
    #[must_use]
    pub fn with_empty_blocks(heights: std::ops::RangeInclusive<u64>) -> Self {
        let node = Self::new();
        for height in heights {
            node.put_block(height, empty_block(height));
            node.put_results(height, empty_results(height));
            node.put_tx_search(height, TxSearchResponse::default());
        }
        node
    }

    /// Script the block response at a height.
    pub fn put_block(&self, height: u64, block: BlockResponse) {
        self.script.lock().blocks.insert(height, block);
    }

    /// Script the block results at a height.
    pub fn put_results(&self, height: u64, results: BlockResultsResponse) {
        self.script.lock().results.insert(height, results);
    }

    /// Script the tx_search response at a height.
    pub fn put_tx_search(&self, height: u64, response: TxSearchResponse) {
        self.script.lock().tx_search.insert(height, response);
    }

    /// Make `block` fail at a height.
    pub fn fail_block_at(&self, height: u64) {
        self.script.lock().fail_block.insert(height);
    }

    /// Make `block_results` fail at a height.
    pub fn fail_results_at(&self, height: u64) {
        self.script.lock().fail_results.insert(height);
    }

    /// Make `tx_search` fail at a height.
    pub fn fail_tx_search_at(&self, height: u64) {
        self.script.lock().fail_tx_search.insert(height);
    }

    /// Report `catching_up = true` for the next `polls` status calls.
    pub fn set_catching_up_for(&self, polls: u32) {
        self.script.lock().catching_up_polls = polls;
    }

    fn scripted_failure(what: &str, height: u64) -> AppError {
        AppError::Infra(InfraError::Node(comet_rpc::CometError::rpc(
            -32603,
            format!("scripted {what} failure at height {height}"),
        )))
    }
}

#[async_trait]
impl NodeClient for ScriptedNode {
    async fn block(&self, height: Height) -> Result<BlockResponse> {
        let script = self.script.lock();
        let h = height.value();
        if script.fail_block.contains(&h) {
            return Err(Self::scripted_failure("block", h));
        }
        script
            .blocks
            .get(&h)
            .cloned()
            .ok_or_else(|| Self::scripted_failure("block", h))
    }

    async fn block_results(&self, height: Height) -> Result<BlockResultsResponse> {
        let script = self.script.lock();
        let h = height.value();
        if script.fail_results.contains(&h) {
            return Err(Self::scripted_failure("block_results", h));
        }
        script
            .results
            .get(&h)
            .cloned()
            .ok_or_else(|| Self::scripted_failure("block_results", h))
    }

    async fn tx_search(&self, height: Height) -> Result<TxSearchResponse> {
        let script = self.script.lock();
        let h = height.value();
        if script.fail_tx_search.contains(&h) {
            return Err(Self::scripted_failure("tx_search", h));
        }
        script
            .tx_search
            .get(&h)
            .cloned()
            .ok_or_else(|| Self::scripted_failure("tx_search", h))
    }

    async fn status(&self) -> Result<Status> {
        let mut script = self.script.lock();
        let catching_up = if script.catching_up_polls > 0 {
            script.catching_up_polls -= 1;
            true
        } else {
            false
        };
        let tip = script.blocks.keys().copied().max().unwrap_or(0);
        Ok(Status {
            node_info: NodeInfo {
                network: TEST_CHAIN_ID.into(),
                moniker: "scripted".into(),
            },
            sync_info: SyncInfo {
                latest_block_height: tip,
                latest_block_time: Utc::now(),
                catching_up,
            },
        })
    }
}
