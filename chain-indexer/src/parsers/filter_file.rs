//! Filter file loading.
//!
//! A filter file is a JSON document describing event and message filters,
//! parsed once at setup and merged with programmatic registrations:
//!
//! ```json
//! {
//!     "beginBlockEventFilters": [{"eventType": "mint"}],
//!     "beginBlockRollingWindowFilters": [{"eventTypePatterns": ["unlock", "transfer"]}],
//!     "endBlockEventFilters": [],
//!     "endBlockRollingWindowFilters": [],
//!     "messageTypeFilters": [{"messageType": "/cosmos.bank.v1beta1.MsgSend"}]
//! }
//! ```
//!
//! An empty or absent file behaves exactly like no file at all.

use std::path::Path;

use serde::Deserialize;

use crate::error::{InfraError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// FILE FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Parsed contents of a filter file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterFile {
    /// Per-type filters for begin-block events.
    #[serde(default)]
    pub begin_block_event_filters: Vec<EventTypeFilterDef>,
    /// Rolling-window filters for begin-block events.
    #[serde(default)]
    pub begin_block_rolling_window_filters: Vec<RollingWindowFilterDef>,
    /// Per-type filters for end-block events.
    #[serde(default)]
    pub end_block_event_filters: Vec<EventTypeFilterDef>,
    /// Rolling-window filters for end-block events.
    #[serde(default)]
    pub end_block_rolling_window_filters: Vec<RollingWindowFilterDef>,
    /// Message type URLs to index; entries merge into one allowlist.
    #[serde(default)]
    pub message_type_filters: Vec<MessageTypeFilterDef>,
}

/// One per-type event filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeFilterDef {
    /// The event type to keep.
    pub event_type: String,
}

/// One rolling-window filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingWindowFilterDef {
    /// Ordered event-type pattern the window must match.
    pub event_type_patterns: Vec<String>,
}

/// One message-type filter entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTypeFilterDef {
    /// Message type URL to keep.
    pub message_type: String,
}

impl FilterFile {
    /// Load and parse a filter file.
    ///
    /// An empty file (ignoring whitespace) yields the default, filterless
    /// document.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(InfraError::Io)?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let parsed = serde_json::from_str(&raw).map_err(InfraError::Serialization)?;
        Ok(parsed)
    }

    /// Whether the file declares no filters at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.begin_block_event_filters.is_empty()
            && self.begin_block_rolling_window_filters.is_empty()
            && self.end_block_event_filters.is_empty()
            && self.end_block_rolling_window_filters.is_empty()
            && self.message_type_filters.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
