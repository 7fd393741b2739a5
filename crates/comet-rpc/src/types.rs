//! Request and response types for CometBFT RPC methods.
//!
//! This module defines the data structures returned by the node:
//!
//! - [`Status`] - Node identity and sync state
//! - [`BlockResponse`] - Block header, data and id at a height
//! - [`BlockResultsResponse`] - ABCI results: tx results plus lifecycle events
//! - [`TxSearchResponse`] - Committed transactions at a height
//!
//! CometBFT serializes 64-bit integers as strings on the wire; the affected
//! fields use `serde_with::DisplayFromStr` so callers see plain integers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Response from the `status` RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    /// Node identity information.
    pub node_info: NodeInfo,
    /// Synchronization state.
    pub sync_info: SyncInfo,
}

impl Status {
    /// The height of the node's current tip.
    #[must_use]
    pub const fn latest_height(&self) -> u64 {
        self.sync_info.latest_block_height
    }

    /// Whether the node has caught up with the chain.
    #[must_use]
    pub const fn is_caught_up(&self) -> bool {
        !self.sync_info.catching_up
    }
}

/// Node identity section of [`Status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Chain id the node is serving (CometBFT calls this `network`).
    pub network: String,
    /// Human-readable node name.
    #[serde(default)]
    pub moniker: String,
}

/// Sync state section of [`Status`].
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncInfo {
    /// Height of the latest committed block.
    #[serde_as(as = "DisplayFromStr")]
    pub latest_block_height: u64,
    /// Timestamp of the latest committed block.
    pub latest_block_time: DateTime<Utc>,
    /// Whether the node is still replaying history.
    pub catching_up: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK
// ═══════════════════════════════════════════════════════════════════════════════

/// Response from the `block` RPC method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResponse {
    /// Identifier (hash) of the block.
    pub block_id: BlockId,
    /// The block itself.
    pub block: Block,
}

/// Hash identifying a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockId {
    /// Uppercase hex block hash.
    pub hash: String,
}

/// A committed block: header plus transaction data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: Header,
    /// Block body.
    pub data: BlockData,
}

/// Block header fields the indexer consumes.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Chain id this block belongs to.
    pub chain_id: String,
    /// Block height.
    #[serde_as(as = "DisplayFromStr")]
    pub height: u64,
    /// Block timestamp.
    pub time: DateTime<Utc>,
    /// Address of the validator that proposed this block.
    pub proposer_address: String,
}

/// Block body: raw transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockData {
    /// Base64-encoded raw transaction bytes, in execution order.
    #[serde(default)]
    pub txs: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK RESULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Response from the `block_results` RPC method.
///
/// Carries the ABCI execution results for a height: one [`TxResult`] per
/// transaction plus the lifecycle events emitted around transaction
/// execution (`begin_block_events` before, `end_block_events` after).
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockResultsResponse {
    /// Height these results belong to.
    #[serde_as(as = "DisplayFromStr")]
    pub height: u64,
    /// Per-transaction execution results, in block order.
    ///
    /// `None` when the block contained no transactions.
    #[serde(default)]
    pub txs_results: Option<Vec<TxResult>>,
    /// Events emitted before transaction execution.
    #[serde(default)]
    pub begin_block_events: Option<Vec<AbciEvent>>,
    /// Events emitted after transaction execution.
    #[serde(default)]
    pub end_block_events: Option<Vec<AbciEvent>>,
}

impl BlockResultsResponse {
    /// Begin-block events, empty slice when absent.
    #[must_use]
    pub fn begin_events(&self) -> &[AbciEvent] {
        self.begin_block_events.as_deref().unwrap_or_default()
    }

    /// End-block events, empty slice when absent.
    #[must_use]
    pub fn end_events(&self) -> &[AbciEvent] {
        self.end_block_events.as_deref().unwrap_or_default()
    }

    /// Per-transaction results, empty slice when absent.
    #[must_use]
    pub fn tx_results(&self) -> &[TxResult] {
        self.txs_results.as_deref().unwrap_or_default()
    }
}

/// ABCI execution result for a single transaction.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxResult {
    /// Result code; 0 means the transaction succeeded.
    #[serde(default)]
    pub code: u32,
    /// Raw log output from execution.
    #[serde(default)]
    pub log: String,
    /// Gas requested by the transaction.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub gas_wanted: i64,
    /// Gas consumed by execution.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub gas_used: i64,
    /// Events emitted during execution.
    #[serde(default)]
    pub events: Vec<AbciEvent>,
}

/// A single ABCI event: a type tag plus ordered key/value attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbciEvent {
    /// Event type, e.g. `transfer` or `message`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Ordered attributes.
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl AbciEvent {
    /// Look up the first attribute with the given key.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// One key/value attribute of an [`AbciEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    #[serde(default)]
    pub value: String,
    /// Whether the node indexed this attribute.
    #[serde(default)]
    pub index: bool,
}

impl EventAttribute {
    /// Convenience constructor used in tests and fixtures.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            index: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TX SEARCH
// ═══════════════════════════════════════════════════════════════════════════════

/// Response from the `tx_search` RPC method, all pages merged.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxSearchResponse {
    /// Matching transactions.
    #[serde(default)]
    pub txs: Vec<TxInfo>,
    /// Total number of matches across all pages.
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub total_count: u64,
}

/// A committed transaction returned by `tx_search`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInfo {
    /// Uppercase hex transaction hash.
    pub hash: String,
    /// Height the transaction was committed at.
    #[serde_as(as = "DisplayFromStr")]
    pub height: u64,
    /// Position of the transaction within its block.
    #[serde(default)]
    pub index: u32,
    /// ABCI execution result.
    pub tx_result: TxResult,
    /// Base64-encoded raw transaction bytes.
    #[serde(default)]
    pub tx: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERNAL TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// JSON-RPC request structure.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a, P: Serialize> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: P,
    pub id: u64,
}

impl<'a, P: Serialize> JsonRpcRequest<'a, P> {
    pub fn new(method: &'a str, params: P, id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// JSON-RPC response wrapper for extracting result or error.
#[derive(Debug, Deserialize)]
pub(crate) struct JsonRpcResponse<T> {
    #[allow(dead_code)]
    pub id: serde_json::Value,
    pub result: Option<T>,
    pub error: Option<crate::error::RpcErrorDetail>,
}

/// Parameters for height-keyed methods (`block`, `block_results`).
#[derive(Debug, Serialize)]
pub(crate) struct HeightParams {
    pub height: String,
}

impl HeightParams {
    pub fn new(height: u64) -> Self {
        Self {
            height: height.to_string(),
        }
    }
}

/// Parameters for the `tx_search` method.
#[derive(Debug, Serialize)]
pub(crate) struct TxSearchParams {
    pub query: String,
    pub prove: bool,
    pub page: String,
    pub per_page: String,
    pub order_by: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
