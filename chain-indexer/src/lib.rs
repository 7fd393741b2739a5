//! Chain Indexer
//!
//! A Rust service that drains a CometBFT chain's historical and live state
//! out of a remote node, parses each block's transactions and lifecycle
//! events, and persists structured records into PostgreSQL.
//!
//! # Architecture
//!
//! The indexer is a multi-stage producer/consumer pipeline over bounded
//! channels:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          PIPELINE CORE                              │
//! │                                                                     │
//! │  ┌──────────┐   heights   ┌───────────┐    raw    ┌────────────┐   │
//! │  │ Enqueuer │────────────▶│ FetchPool │──────────▶│ Processor  │   │
//! │  └──────────┘  (cap 10k)  │ N workers │  (cap 10) └─────┬──────┘   │
//! │                           └───────────┘                 │          │
//! │                                           tx batches ┌──┴──┐       │
//! │                                        event batches │     │       │
//! │                                                      ▼     ▼       │
//! │                                                ┌───────────────┐   │
//! │                                                │   Committer   │   │
//! │                                                └───────┬───────┘   │
//! │                                                        ▼           │
//! │                                                     Store          │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ParserRegistry` (custom parsers + filters) is built before the
//! pipeline starts and injected read-only into the processor and committer.
//!
//! # Modules
//!
//! - [`types`] - Domain types (heights, bundles, batches, wrappers)
//! - [`error`] - Layered error types
//! - [`config`] - Configuration loading and validation
//! - [`parsers`] - Parser/filter registries and the tx decoding seam
//! - [`pipeline`] - The five pipeline components and their wiring
//! - [`ports`] - Port traits for the remote node and the store
//! - [`store`] - Data persistence (PostgreSQL, in-memory)
//!
//! # Getting Started
//!
//! ```bash
//! # Set up environment
//! cp .env.example .env
//! # Edit .env with your configuration
//!
//! # Run migrations
//! chain-indexer migrate
//!
//! # Start indexing
//! chain-indexer index
//! ```
//!
//! # Embedding
//!
//! Embedders register custom message parsers, block-event parsers and
//! filters through [`pipeline::PipelineBuilder`] before starting the
//! pipeline:
//!
//! ```ignore
//! let config = PipelineBuilder::new()
//!     .register_message_parser("/x.foo.v1.MsgBar", Arc::new(MyParser))?
//!     .build()?;
//! let summary = Pipeline::new(settings, node, store, config).run().await?;
//! ```

#![doc(html_root_url = "https://docs.rs/chain-indexer")]

pub mod config;
pub mod error;
pub mod parsers;
pub mod pipeline;
pub mod ports;
pub mod store;
pub mod types;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}
