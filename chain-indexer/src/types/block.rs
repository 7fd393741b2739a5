//! Enqueue jobs, raw fetch bundles and the canonical block record.

use chrono::{DateTime, Utc};
use comet_rpc::{BlockResponse, BlockResultsResponse, TxSearchResponse};
use serde::{Deserialize, Serialize};

use super::primitives::Height;

// ═══════════════════════════════════════════════════════════════════════════════
// ENQUEUE JOB
// ═══════════════════════════════════════════════════════════════════════════════

/// One unit of work produced by the enqueuer.
///
/// A job carries per-height facet flags: a re-index run may request only one
/// of the two facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueJob {
    /// The height to index.
    pub height: Height,
    /// Whether to fetch and index transactions.
    pub index_txs: bool,
    /// Whether to fetch and index block lifecycle events.
    pub index_events: bool,
}

impl EnqueueJob {
    /// Create a job requesting both facets.
    #[must_use]
    pub const fn full(height: Height) -> Self {
        Self {
            height,
            index_txs: true,
            index_events: true,
        }
    }

    /// Create a job requesting only the transaction facet.
    #[must_use]
    pub const fn txs_only(height: Height) -> Self {
        Self {
            height,
            index_txs: true,
            index_events: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RAW BUNDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Raw per-height data emitted by a fetch worker, consumed exactly once by
/// the processor.
///
/// Payloads are the node's decoded responses; the facet flags come from the
/// originating [`EnqueueJob`], and the failure bits record which optional
/// fetches did not succeed.
#[derive(Debug, Clone)]
pub struct RawBundle {
    /// The height this bundle belongs to.
    pub height: Height,
    /// Block header, id and data.
    pub block: BlockResponse,
    /// ABCI results; present when the event facet (or the tx fallback
    /// source) was fetched successfully.
    pub results: Option<BlockResultsResponse>,
    /// Batched `tx_search` response, the preferred transaction source.
    pub tx_search: Option<TxSearchResponse>,
    /// Whether the transaction facet was requested.
    pub index_txs: bool,
    /// Whether the event facet was requested.
    pub index_events: bool,
    /// Set when the transaction sources could not be fetched.
    pub tx_fetch_failed: bool,
    /// Set when the block results could not be fetched.
    pub event_fetch_failed: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Canonicalized block identity, referenced by every batch built from the
/// same bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Chain id from the block header.
    pub chain_id: String,
    /// Block height.
    pub height: Height,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
    /// Address of the proposing validator.
    pub proposer: String,
    /// Uppercase hex block hash.
    pub hash: String,
}

impl BlockRecord {
    /// Build the canonical record from a node block response.
    #[must_use]
    pub fn from_response(response: &BlockResponse) -> Self {
        let header = &response.block.header;
        Self {
            chain_id: header.chain_id.clone(),
            height: Height::new(header.height),
            timestamp: header.time,
            proposer: header.proposer_address.clone(),
            hash: response.block_id.hash.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use comet_rpc::types::{Block, BlockData, BlockId, Header};

    use super::*;

    fn sample_response() -> BlockResponse {
        BlockResponse {
            block_id: BlockId {
                hash: "ABCD".into(),
            },
            block: Block {
                header: Header {
                    chain_id: "testchain-1".into(),
                    height: 100,
                    time: Utc::now(),
                    proposer_address: "PROP".into(),
                },
                data: BlockData::default(),
            },
        }
    }

    #[test]
    fn job_constructors() {
        let full = EnqueueJob::full(Height::new(5));
        assert!(full.index_txs && full.index_events);

        let txs = EnqueueJob::txs_only(Height::new(5));
        assert!(txs.index_txs && !txs.index_events);
    }

    #[test]
    fn block_record_from_response() {
        let record = BlockRecord::from_response(&sample_response());
        assert_eq!(record.height, Height::new(100));
        assert_eq!(record.chain_id, "testchain-1");
        assert_eq!(record.hash, "ABCD");
        assert_eq!(record.proposer, "PROP");
    }
}
