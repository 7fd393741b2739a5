//! The frozen parser registry and its builder.
//!
//! The registry owns parsers (via `Arc`) and provides lookup by message type
//! URL or event type. It is built during startup and then only read; no
//! locking is needed on the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use super::filters::StaticBlockEventFilterRegistry;
use super::traits::{BlockEventParser, MessageParser, MessageTypeFilter};
use crate::error::{AppError, Result};
use crate::types::LifecyclePosition;

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable lookup surface for custom parsers and filters.
///
/// # Thread Safety
///
/// Built before the pipeline starts and frozen behind `Arc`; readable from
/// any task without locking.
#[derive(Default)]
pub struct ParserRegistry {
    message_parsers: HashMap<String, Vec<Arc<dyn MessageParser>>>,
    begin_event_parsers: HashMap<String, Vec<Arc<dyn BlockEventParser>>>,
    end_event_parsers: HashMap<String, Vec<Arc<dyn BlockEventParser>>>,
    message_filters: Vec<Arc<dyn MessageTypeFilter>>,
    begin_filters: StaticBlockEventFilterRegistry,
    end_filters: StaticBlockEventFilterRegistry,
    event_parser_positions: HashMap<String, LifecyclePosition>,
    message_parser_ids: Vec<String>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("message_parser_types", &self.message_parsers.len())
            .field("begin_event_parser_types", &self.begin_event_parsers.len())
            .field("end_event_parser_types", &self.end_event_parsers.len())
            .field("message_filters", &self.message_filters.len())
            .field("begin_filters", &self.begin_filters.num_filters())
            .field("end_filters", &self.end_filters.num_filters())
            .finish()
    }
}

impl ParserRegistry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> ParserRegistryBuilder {
        ParserRegistryBuilder::default()
    }

    /// Custom parsers registered under a message type URL.
    #[must_use]
    pub fn message_parsers(&self, type_url: &str) -> &[Arc<dyn MessageParser>] {
        self.message_parsers
            .get(type_url)
            .map_or(&[], Vec::as_slice)
    }

    /// Custom begin-block event parsers registered under an event type.
    #[must_use]
    pub fn begin_block_event_parsers(&self, event_type: &str) -> &[Arc<dyn BlockEventParser>] {
        self.begin_event_parsers
            .get(event_type)
            .map_or(&[], Vec::as_slice)
    }

    /// Custom end-block event parsers registered under an event type.
    #[must_use]
    pub fn end_block_event_parsers(&self, event_type: &str) -> &[Arc<dyn BlockEventParser>] {
        self.end_event_parsers
            .get(event_type)
            .map_or(&[], Vec::as_slice)
    }

    /// Event parsers for the given lifecycle position and event type.
    #[must_use]
    pub fn block_event_parsers(
        &self,
        position: LifecyclePosition,
        event_type: &str,
    ) -> &[Arc<dyn BlockEventParser>] {
        match position {
            LifecyclePosition::Begin => self.begin_block_event_parsers(event_type),
            LifecyclePosition::End => self.end_block_event_parsers(event_type),
        }
    }

    /// All registered message type filters.
    #[must_use]
    pub fn message_type_filters(&self) -> &[Arc<dyn MessageTypeFilter>] {
        &self.message_filters
    }

    /// Whether a message of this type survives every registered filter.
    ///
    /// No filters means everything is indexed.
    #[must_use]
    pub fn should_index_message(&self, type_url: &str) -> bool {
        self.message_filters
            .iter()
            .all(|f| f.should_index(type_url))
    }

    /// The begin-block event filter registry.
    #[must_use]
    pub const fn begin_block_filter_registry(&self) -> &StaticBlockEventFilterRegistry {
        &self.begin_filters
    }

    /// The end-block event filter registry.
    #[must_use]
    pub const fn end_block_filter_registry(&self) -> &StaticBlockEventFilterRegistry {
        &self.end_filters
    }

    /// Identifiers of all registered message parsers, in registration order.
    #[must_use]
    pub fn message_parser_identifiers(&self) -> &[String] {
        &self.message_parser_ids
    }

    /// Identifier and lifecycle position of every registered block-event
    /// parser.
    #[must_use]
    pub fn block_event_parser_registrations(&self) -> Vec<(String, LifecyclePosition)> {
        let mut registrations: Vec<_> = self
            .event_parser_positions
            .iter()
            .map(|(id, pos)| (id.clone(), *pos))
            .collect();
        registrations.sort();
        registrations
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects parser and filter registrations and produces a frozen
/// [`ParserRegistry`].
///
/// Identifier uniqueness is enforced per kind at registration time; a
/// duplicate fails setup before any worker starts. Registering the *same*
/// parser instance under additional type keys is allowed.
#[derive(Default)]
pub struct ParserRegistryBuilder {
    registry: ParserRegistry,
    message_parsers_by_id: HashMap<String, Arc<dyn MessageParser>>,
    event_parsers_by_id: HashMap<String, Arc<dyn BlockEventParser>>,
}

impl std::fmt::Debug for ParserRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistryBuilder")
            .field("registry", &self.registry)
            .finish()
    }
}

impl ParserRegistryBuilder {
    /// Register a custom message parser under a message type URL.
    ///
    /// # Errors
    ///
    /// Returns a setup error when a *different* parser with the same
    /// identifier is already registered.
    pub fn register_message_parser(
        mut self,
        type_url: impl Into<String>,
        parser: Arc<dyn MessageParser>,
    ) -> Result<Self> {
        let id = parser.identifier().to_owned();
        let type_url = type_url.into();

        if let Some(existing) = self.message_parsers_by_id.get(&id) {
            if !Arc::ptr_eq(existing, &parser) {
                return Err(AppError::Setup(format!(
                    "duplicate message parser identifier '{id}'"
                )));
            }
        } else {
            self.message_parsers_by_id.insert(id.clone(), parser.clone());
            self.registry.message_parser_ids.push(id.clone());
        }

        info!(parser_id = %id, %type_url, "Registering message parser");
        self.registry
            .message_parsers
            .entry(type_url)
            .or_default()
            .push(parser);
        Ok(self)
    }

    /// Register a custom block-event parser under an event type.
    ///
    /// # Errors
    ///
    /// Returns a setup error when a *different* parser with the same
    /// identifier is already registered.
    pub fn register_block_event_parser(
        mut self,
        position: LifecyclePosition,
        event_type: impl Into<String>,
        parser: Arc<dyn BlockEventParser>,
    ) -> Result<Self> {
        let id = parser.identifier().to_owned();
        let event_type = event_type.into();

        if let Some(existing) = self.event_parsers_by_id.get(&id) {
            if !Arc::ptr_eq(existing, &parser) {
                return Err(AppError::Setup(format!(
                    "duplicate block event parser identifier '{id}'"
                )));
            }
        } else {
            self.event_parsers_by_id.insert(id.clone(), parser.clone());
            self.registry
                .event_parser_positions
                .insert(id.clone(), position);
        }

        info!(parser_id = %id, %event_type, %position, "Registering block event parser");
        let parsers = match position {
            LifecyclePosition::Begin => &mut self.registry.begin_event_parsers,
            LifecyclePosition::End => &mut self.registry.end_event_parsers,
        };
        parsers.entry(event_type).or_default().push(parser);
        Ok(self)
    }

    /// Register a message type filter.
    #[must_use]
    pub fn register_message_type_filter(mut self, filter: Arc<dyn MessageTypeFilter>) -> Self {
        self.registry.message_filters.push(filter);
        self
    }

    /// Add a per-type block event filter.
    #[must_use]
    pub fn add_block_event_filter(
        mut self,
        position: LifecyclePosition,
        filter: Arc<dyn super::filters::BlockEventFilter>,
    ) -> Self {
        self.filters_mut(position).add_event_filter(filter);
        self
    }

    /// Add a simple event-type filter.
    #[must_use]
    pub fn add_event_type_filter(
        mut self,
        position: LifecyclePosition,
        event_type: impl Into<String>,
    ) -> Self {
        self.filters_mut(position).add_event_type(event_type);
        self
    }

    /// Add a rolling-window filter.
    #[must_use]
    pub fn add_rolling_window_filter(
        mut self,
        position: LifecyclePosition,
        filter: super::filters::RollingWindowFilter,
    ) -> Self {
        self.filters_mut(position).add_rolling_window(filter);
        self
    }

    fn filters_mut(&mut self, position: LifecyclePosition) -> &mut StaticBlockEventFilterRegistry {
        match position {
            LifecyclePosition::Begin => &mut self.registry.begin_filters,
            LifecyclePosition::End => &mut self.registry.end_filters,
        }
    }

    /// Freeze the registrations into an immutable registry.
    #[must_use]
    pub fn build(self) -> ParserRegistry {
        self.registry
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
