//! Block lifecycle event batches and wrappers.
//!
//! Begin-block and end-block events are emitted by the chain around
//! transaction execution and are distinct from in-tx events.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::block::BlockRecord;

// ═══════════════════════════════════════════════════════════════════════════════
// LIFECYCLE POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Where in the block lifecycle an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecyclePosition {
    /// Before transaction execution.
    Begin,
    /// After transaction execution.
    End,
}

impl LifecyclePosition {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Begin => "BEGIN",
            Self::End => "END",
        }
    }
}

impl fmt::Display for LifecyclePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT WRAPPER
// ═══════════════════════════════════════════════════════════════════════════════

/// One block lifecycle event with its ordered attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWrapper {
    /// Event type, e.g. `coin_received`.
    pub kind: String,
    /// Ordered key/value attributes as received from the node.
    pub attributes: Vec<(String, String)>,
    /// Lifecycle position of this event.
    pub position: LifecyclePosition,
    /// Position of the event within its lifecycle section.
    pub event_index: usize,
    /// Custom parser outputs keyed by parser identifier.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifacts: HashMap<String, serde_json::Value>,
}

impl EventWrapper {
    /// Create a wrapper with no artifacts.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        attributes: Vec<(String, String)>,
        position: LifecyclePosition,
        event_index: usize,
    ) -> Self {
        Self {
            kind: kind.into(),
            attributes,
            position,
            event_index,
            artifacts: HashMap::new(),
        }
    }

    /// Look up the first attribute with the given key.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT BATCH
// ═══════════════════════════════════════════════════════════════════════════════

/// All surviving lifecycle events of one block, committed atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBatch {
    /// The block the events belong to.
    pub block: BlockRecord,
    /// Begin-block events that passed the filters, in emission order.
    pub begin_events: Vec<EventWrapper>,
    /// End-block events that passed the filters, in emission order.
    pub end_events: Vec<EventWrapper>,
}

impl EventBatch {
    /// Total number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.begin_events.len() + self.end_events.len()
    }

    /// Whether the batch carries no events at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.begin_events.is_empty() && self.end_events.is_empty()
    }

    /// Whether any event carries custom parser artifacts.
    #[must_use]
    pub fn has_artifacts(&self) -> bool {
        self.begin_events
            .iter()
            .chain(self.end_events.iter())
            .any(|e| !e.artifacts.is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::types::Height;

    fn sample_batch() -> EventBatch {
        EventBatch {
            block: BlockRecord {
                chain_id: "testchain-1".into(),
                height: Height::new(1),
                timestamp: Utc::now(),
                proposer: "PROP".into(),
                hash: "AA".into(),
            },
            begin_events: vec![EventWrapper::new(
                "mint",
                vec![("amount".into(), "5".into())],
                LifecyclePosition::Begin,
                0,
            )],
            end_events: vec![],
        }
    }

    #[test]
    fn batch_len_and_empty() {
        let batch = sample_batch();
        assert_eq!(batch.len(), 1);
        assert!(!batch.is_empty());
    }

    #[test]
    fn attr_lookup() {
        let batch = sample_batch();
        assert_eq!(batch.begin_events[0].attr("amount"), Some("5"));
        assert_eq!(batch.begin_events[0].attr("missing"), None);
    }

    #[test]
    fn position_strings() {
        assert_eq!(LifecyclePosition::Begin.as_str(), "BEGIN");
        assert_eq!(LifecyclePosition::End.as_str(), "END");
    }
}
