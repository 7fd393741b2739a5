//! Transaction batches and message wrappers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::block::BlockRecord;

// ═══════════════════════════════════════════════════════════════════════════════
// MESSAGE WRAPPER
// ═══════════════════════════════════════════════════════════════════════════════

/// One parsed message of a transaction.
///
/// `value` is the decoded message body produced by the tx decoding seam;
/// `artifacts` holds the output of each custom parser that handled this
/// message, keyed by the parser's identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageWrapper {
    /// Message type URL, e.g. `/cosmos.bank.v1beta1.MsgSend`.
    pub type_url: String,
    /// Position of the message within its transaction.
    pub message_index: usize,
    /// Decoded message body.
    pub value: serde_json::Value,
    /// Custom parser outputs keyed by parser identifier.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifacts: HashMap<String, serde_json::Value>,
}

impl MessageWrapper {
    /// Create a wrapper with no artifacts.
    #[must_use]
    pub fn new(type_url: impl Into<String>, message_index: usize, value: serde_json::Value) -> Self {
        Self {
            type_url: type_url.into(),
            message_index,
            value,
            artifacts: HashMap::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TX WRAPPER
// ═══════════════════════════════════════════════════════════════════════════════

/// One parsed transaction with its ordered messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxWrapper {
    /// Uppercase hex transaction hash.
    pub hash: String,
    /// Position of the transaction within its block.
    pub tx_index: usize,
    /// ABCI result code; 0 means success.
    pub code: u32,
    /// Parsed messages in transaction order.
    pub messages: Vec<MessageWrapper>,
}

impl TxWrapper {
    /// Whether any message carries custom parser artifacts.
    #[must_use]
    pub fn has_artifacts(&self) -> bool {
        self.messages.iter().any(|m| !m.artifacts.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TX BATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// All parsed transactions of one block, committed atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBatch {
    /// The block the transactions belong to.
    pub block: BlockRecord,
    /// Parsed transactions in block order.
    pub txs: Vec<TxWrapper>,
}

impl TxBatch {
    /// Whether any transaction carries custom parser artifacts.
    #[must_use]
    pub fn has_artifacts(&self) -> bool {
        self.txs.iter().any(TxWrapper::has_artifacts)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
