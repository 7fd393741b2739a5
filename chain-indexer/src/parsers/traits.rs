//! Parser and filter capability traits.
//!
//! Each plugin exposes a stable identifier plus a parse or match operation,
//! and is stored in the registry keyed by type URL or event type. The
//! identifier ties persisted artifacts to the parser that produced them.

use std::collections::BTreeSet;

use crate::error::DomainError;
use crate::types::{BlockRecord, EventWrapper, MessageWrapper};

// ═══════════════════════════════════════════════════════════════════════════════
// MESSAGE PARSER
// ═══════════════════════════════════════════════════════════════════════════════

/// Custom parser for transaction messages of a particular type URL.
///
/// Parsers run during the processor's tx path. A parser returning
/// `Ok(Some(value))` attaches `value` to the message as an artifact keyed by
/// [`identifier`](Self::identifier); `Ok(None)` attaches nothing.
///
/// # Identifier
///
/// Identifiers must be unique among all registered message parsers for the
/// lifetime of the process. A duplicate registration fails pipeline setup.
pub trait MessageParser: Send + Sync {
    /// Stable unique identifier for this parser.
    fn identifier(&self) -> &str;

    /// Parse one message.
    ///
    /// # Errors
    ///
    /// A returned error marks the whole block as `UNPROCESSABLE_TX` and
    /// drops the tx batch for that height.
    fn parse(
        &self,
        message: &MessageWrapper,
        block: &BlockRecord,
    ) -> Result<Option<serde_json::Value>, DomainError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK EVENT PARSER
// ═══════════════════════════════════════════════════════════════════════════════

/// Custom parser for begin/end block lifecycle events of a particular type.
///
/// Parsers run during the processor's event path, before filtering. A parser
/// returning `Ok(Some(value))` attaches `value` to the event as an artifact
/// keyed by [`identifier`](Self::identifier).
pub trait BlockEventParser: Send + Sync {
    /// Stable unique identifier for this parser.
    fn identifier(&self) -> &str;

    /// Parse one lifecycle event.
    ///
    /// # Errors
    ///
    /// A returned error marks the block as `FAILED_EVENT_HANDLING` and drops
    /// the event batch for that height; the tx facet is unaffected.
    fn parse(
        &self,
        event: &EventWrapper,
        block: &BlockRecord,
    ) -> Result<Option<serde_json::Value>, DomainError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// MESSAGE TYPE FILTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Accept/reject predicate over message type URLs.
///
/// Applied during transaction parsing; a message is dropped as soon as any
/// registered filter rejects its type URL. No filters means every message is
/// kept.
pub trait MessageTypeFilter: Send + Sync {
    /// Whether messages of this type should be indexed.
    fn should_index(&self, type_url: &str) -> bool;
}

/// Allowlist filter over exact message type URLs.
///
/// This is the filter shape the filter file produces: all file entries merge
/// into one allowlist so that listing several types keeps all of them.
#[derive(Debug, Clone, Default)]
pub struct MessageTypeAllowlist {
    allowed: BTreeSet<String>,
}

impl MessageTypeAllowlist {
    /// Create an allowlist from type URLs. Duplicates collapse.
    #[must_use]
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Add one type URL. Idempotent.
    pub fn insert(&mut self, type_url: impl Into<String>) {
        self.allowed.insert(type_url.into());
    }

    /// Number of distinct type URLs in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl MessageTypeFilter for MessageTypeAllowlist {
    fn should_index(&self, type_url: &str) -> bool {
        self.allowed.contains(type_url)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowlist_matches_exact_types() {
        let filter = MessageTypeAllowlist::new(["/bank.v1.MsgSend", "/staking.v1.MsgDelegate"]);

        assert!(filter.should_index("/bank.v1.MsgSend"));
        assert!(filter.should_index("/staking.v1.MsgDelegate"));
        assert!(!filter.should_index("/gov.v1.MsgVote"));
    }

    #[test]
    fn allowlist_insert_is_idempotent() {
        let mut filter = MessageTypeAllowlist::default();
        filter.insert("/bank.v1.MsgSend");
        filter.insert("/bank.v1.MsgSend");

        assert_eq!(filter.len(), 1);
    }
}
