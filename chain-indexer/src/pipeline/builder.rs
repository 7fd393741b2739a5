//! Pipeline builder: the registration surface for embedders.
//!
//! The builder collects parser, filter, decoder and enqueue-source
//! registrations and produces an immutable [`PipelineConfig`] consumed by
//! [`Pipeline::new`](super::Pipeline::new). All identifier-uniqueness
//! checks happen here, before any worker starts.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::parsers::{
    BlockEventFilter, BlockEventParser, EventDerivedDecoder, FilterFile, MessageParser,
    MessageTypeAllowlist, MessageTypeFilter, ParserRegistry, ParserRegistryBuilder,
    RollingWindowFilter, TxDecoder,
};
use crate::types::{EnqueueJob, LifecyclePosition};

// ═══════════════════════════════════════════════════════════════════════════════
// ENQUEUE SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// A custom producer of enqueue jobs.
///
/// When registered, it supersedes the built-in mode selection entirely: the
/// enqueuer hands it the job sender and the source becomes the sole closer
/// of the heights channel (by returning, which drops the sender).
#[async_trait]
pub trait EnqueueSource: Send + Sync {
    /// Produce jobs until exhausted, then return.
    ///
    /// # Errors
    ///
    /// A returned error is fatal for the run.
    async fn run(self: Box<Self>, jobs: mpsc::Sender<EnqueueJob>) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Frozen output of [`PipelineBuilder`].
pub struct PipelineConfig {
    pub(crate) registry: Arc<ParserRegistry>,
    pub(crate) decoder: Arc<dyn TxDecoder>,
    pub(crate) enqueue_override: Option<Box<dyn EnqueueSource>>,
    pub(crate) custom_migrations: Vec<String>,
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("registry", &self.registry)
            .field("enqueue_override", &self.enqueue_override.is_some())
            .field("custom_migrations", &self.custom_migrations.len())
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            registry: Arc::new(ParserRegistry::builder().build()),
            decoder: Arc::new(EventDerivedDecoder),
            enqueue_override: None,
            custom_migrations: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects registrations and produces a [`PipelineConfig`].
///
/// # Example
///
/// ```ignore
/// let config = PipelineBuilder::new()
///     .register_message_parser("/x.foo.v1.MsgBar", Arc::new(MyParser))?
///     .with_filter_file(&FilterFile::load("filters.json")?)
///     .build();
/// ```
pub struct PipelineBuilder {
    registry: ParserRegistryBuilder,
    decoder: Arc<dyn TxDecoder>,
    enqueue_override: Option<Box<dyn EnqueueSource>>,
    custom_migrations: Vec<String>,
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("registry", &self.registry)
            .field("enqueue_override", &self.enqueue_override.is_some())
            .finish()
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            registry: ParserRegistry::builder(),
            decoder: Arc::new(EventDerivedDecoder),
            enqueue_override: None,
            custom_migrations: Vec::new(),
        }
    }
}

impl PipelineBuilder {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom message parser under a message type URL.
    ///
    /// # Errors
    ///
    /// Fails setup when a different parser with the same identifier is
    /// already registered.
    pub fn register_message_parser(
        mut self,
        type_url: impl Into<String>,
        parser: Arc<dyn MessageParser>,
    ) -> Result<Self> {
        self.registry = self.registry.register_message_parser(type_url, parser)?;
        Ok(self)
    }

    /// Register a custom block-event parser under an event type.
    ///
    /// # Errors
    ///
    /// Fails setup when a different parser with the same identifier is
    /// already registered.
    pub fn register_block_event_parser(
        mut self,
        position: LifecyclePosition,
        event_type: impl Into<String>,
        parser: Arc<dyn BlockEventParser>,
    ) -> Result<Self> {
        self.registry = self
            .registry
            .register_block_event_parser(position, event_type, parser)?;
        Ok(self)
    }

    /// Register an additional message type filter.
    #[must_use]
    pub fn register_message_type_filter(mut self, filter: Arc<dyn MessageTypeFilter>) -> Self {
        self.registry = self.registry.register_message_type_filter(filter);
        self
    }

    /// Add a per-type block event filter.
    #[must_use]
    pub fn add_block_event_filter(
        mut self,
        position: LifecyclePosition,
        filter: Arc<dyn BlockEventFilter>,
    ) -> Self {
        self.registry = self.registry.add_block_event_filter(position, filter);
        self
    }

    /// Add a rolling-window block event filter.
    #[must_use]
    pub fn add_rolling_window_filter(
        mut self,
        position: LifecyclePosition,
        filter: RollingWindowFilter,
    ) -> Self {
        self.registry = self.registry.add_rolling_window_filter(position, filter);
        self
    }

    /// Merge a parsed filter file into the registries.
    ///
    /// File entries are idempotent over duplicates; the message-type entries
    /// merge into a single allowlist filter (an empty list adds no filter).
    #[must_use]
    pub fn with_filter_file(mut self, file: &FilterFile) -> Self {
        for def in &file.begin_block_event_filters {
            self.registry = self
                .registry
                .add_event_type_filter(LifecyclePosition::Begin, def.event_type.clone());
        }
        for def in &file.begin_block_rolling_window_filters {
            self.registry = self.registry.add_rolling_window_filter(
                LifecyclePosition::Begin,
                RollingWindowFilter::new(def.event_type_patterns.clone()),
            );
        }
        for def in &file.end_block_event_filters {
            self.registry = self
                .registry
                .add_event_type_filter(LifecyclePosition::End, def.event_type.clone());
        }
        for def in &file.end_block_rolling_window_filters {
            self.registry = self.registry.add_rolling_window_filter(
                LifecyclePosition::End,
                RollingWindowFilter::new(def.event_type_patterns.clone()),
            );
        }
        if !file.message_type_filters.is_empty() {
            let allowlist = MessageTypeAllowlist::new(
                file.message_type_filters
                    .iter()
                    .map(|def| def.message_type.clone()),
            );
            self.registry = self
                .registry
                .register_message_type_filter(Arc::new(allowlist));
        }
        self
    }

    /// Replace the transaction decoding seam.
    #[must_use]
    pub fn with_tx_decoder(mut self, decoder: Arc<dyn TxDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Inject a custom enqueue source, superseding mode selection.
    #[must_use]
    pub fn with_enqueue_source(mut self, source: Box<dyn EnqueueSource>) -> Self {
        self.enqueue_override = Some(source);
        self
    }

    /// Register a custom persistence model migration, run once at setup.
    #[must_use]
    pub fn register_custom_migration(mut self, ddl: impl Into<String>) -> Self {
        self.custom_migrations.push(ddl.into());
        self
    }

    /// Freeze the registrations.
    #[must_use]
    pub fn build(self) -> PipelineConfig {
        PipelineConfig {
            registry: Arc::new(self.registry.build()),
            decoder: self.decoder,
            enqueue_override: self.enqueue_override,
            custom_migrations: self.custom_migrations,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
