//! The transaction decoding seam.
//!
//! Turning raw node payloads into per-message wrappers is chain-specific:
//! a stock CometBFT node only exposes ABCI events, while application-aware
//! embedders may decode the protobuf tx bytes directly. [`TxDecoder`] is the
//! seam between the two; [`EventDerivedDecoder`] is the default
//! implementation shipped with the indexer, and embedders can replace it
//! through [`PipelineBuilder`](crate::pipeline::PipelineBuilder).

use base64::Engine as _;
use comet_rpc::types::{AbciEvent, TxResult};
use sha2::{Digest, Sha256};

use crate::error::DomainError;
use crate::types::{MessageWrapper, RawBundle};

// ═══════════════════════════════════════════════════════════════════════════════
// DECODED TX
// ═══════════════════════════════════════════════════════════════════════════════

/// One decoded transaction, before filters and custom parsers run.
#[derive(Debug, Clone)]
pub struct DecodedTx {
    /// Uppercase hex transaction hash.
    pub hash: String,
    /// Position of the transaction within its block.
    pub tx_index: usize,
    /// ABCI result code; 0 means success.
    pub code: u32,
    /// Messages in transaction order.
    pub messages: Vec<MessageWrapper>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Converts a raw bundle's transaction payloads into [`DecodedTx`]s.
pub trait TxDecoder: Send + Sync {
    /// Decode every transaction of the bundle's block.
    ///
    /// The preferred source is the batched `tx_search` response; when it is
    /// absent the decoder derives transactions from the block results.
    ///
    /// # Errors
    ///
    /// A returned error marks the height as `UNPROCESSABLE_TX` and drops the
    /// tx batch; the event facet is unaffected.
    fn decode(&self, bundle: &RawBundle) -> Result<Vec<DecodedTx>, DomainError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT-DERIVED DECODER
// ═══════════════════════════════════════════════════════════════════════════════

/// Default decoder deriving messages from ABCI events.
///
/// Message boundaries come from `message` events carrying an `action`
/// attribute (the message type URL); the remaining events are grouped onto
/// their message via the `msg_index` attribute.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDerivedDecoder;

impl TxDecoder for EventDerivedDecoder {
    fn decode(&self, bundle: &RawBundle) -> Result<Vec<DecodedTx>, DomainError> {
        if let Some(search) = &bundle.tx_search {
            return search
                .txs
                .iter()
                .map(|tx| {
                    Ok(DecodedTx {
                        hash: tx.hash.clone(),
                        tx_index: tx.index as usize,
                        code: tx.tx_result.code,
                        messages: messages_from_result(&tx.tx_result)?,
                    })
                })
                .collect();
        }

        if let Some(results) = &bundle.results {
            let raw_txs = &bundle.block.block.data.txs;
            return results
                .tx_results()
                .iter()
                .enumerate()
                .map(|(tx_index, result)| {
                    let raw = raw_txs.get(tx_index).ok_or_else(|| {
                        DomainError::MessageDecode(format!(
                            "block data holds {} txs but results hold more (index {tx_index})",
                            raw_txs.len()
                        ))
                    })?;
                    Ok(DecodedTx {
                        hash: tx_hash(raw)?,
                        tx_index,
                        code: result.code,
                        messages: messages_from_result(result)?,
                    })
                })
                .collect();
        }

        Err(DomainError::MessageDecode(
            "no transaction source in bundle".into(),
        ))
    }
}

/// Derive message wrappers from a transaction's ABCI events.
fn messages_from_result(result: &TxResult) -> Result<Vec<MessageWrapper>, DomainError> {
    let mut actions: Vec<(usize, String)> = Vec::new();
    let mut implicit_index = 0usize;

    for event in &result.events {
        if event.kind != "message" {
            continue;
        }
        let Some(action) = event.attr("action") else {
            continue;
        };
        let index = match event.attr("msg_index") {
            Some(raw) => raw.parse().map_err(|_| {
                DomainError::MessageDecode(format!("invalid msg_index '{raw}' on message event"))
            })?,
            None => implicit_index,
        };
        implicit_index = index + 1;

        if !actions.iter().any(|(i, _)| *i == index) {
            actions.push((index, action.to_owned()));
        }
    }

    actions.sort_by_key(|(index, _)| *index);

    actions
        .into_iter()
        .map(|(index, action)| {
            let related = related_events(&result.events, index);
            Ok(MessageWrapper::new(
                action,
                index,
                serde_json::json!({ "events": related }),
            ))
        })
        .collect()
}

/// Collect the events attributed to one message index.
fn related_events(events: &[AbciEvent], index: usize) -> Vec<serde_json::Value> {
    let wanted = index.to_string();
    events
        .iter()
        .filter(|event| event.attr("msg_index") == Some(wanted.as_str()))
        .map(|event| {
            let attributes: Vec<serde_json::Value> = event
                .attributes
                .iter()
                .map(|a| serde_json::json!({"key": a.key, "value": a.value}))
                .collect();
            serde_json::json!({"type": event.kind, "attributes": attributes})
        })
        .collect()
}

/// CometBFT transaction hash: SHA-256 of the raw tx bytes, uppercase hex.
fn tx_hash(raw_base64: &str) -> Result<String, DomainError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw_base64)
        .map_err(|e| DomainError::MessageDecode(format!("invalid base64 tx bytes: {e}")))?;
    Ok(hex::encode_upper(Sha256::digest(&bytes)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
