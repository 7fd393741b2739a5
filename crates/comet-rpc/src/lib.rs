//! Typed CometBFT JSON-RPC client.
//!
//! This crate provides [`CometClient`], a specialized RPC client for the
//! JSON-RPC interface exposed by CometBFT (Tendermint) full nodes. It covers
//! the four calls a block indexer needs:
//!
//! | Method | Description |
//! |--------|-------------|
//! | `status` | Node sync state and chain identity |
//! | `block` | Block header, data and proposer at a height |
//! | `block_results` | ABCI results: tx results plus begin/end block events |
//! | `tx_search` | Committed transactions at a height (paginated) |
//!
//! # Crate Relationships
//!
//! This is a **low-level crate** in the indexer stack:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Application Layer (chain-indexer)                       │
//! │  └─ NodeClient port wraps this crate                     │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  RPC Layer (comet-rpc) ◄── YOU ARE HERE                  │
//! │  └─ Direct CometBFT JSON-RPC access                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use comet_rpc::CometClient;
//!
//! let client = CometClient::new("https://rpc.example.com:26657")?;
//!
//! let status = client.status().await?;
//! println!("tip = {}", status.sync_info.latest_block_height);
//!
//! let block = client.block(1234).await?;
//! let results = client.block_results(1234).await?;
//! let txs = client.tx_search(1234).await?;
//! ```
//!
//! # Transient Errors
//!
//! Remote nodes behind load balancers occasionally drop connections
//! mid-response, which surfaces as an error message suffixed with `EOF`.
//! Every call retries exactly once on such errors before surfacing them.
//! Further retry policy belongs to the caller; [`CometError::is_retryable`]
//! classifies errors to support it.
//!
//! # Pagination
//!
//! `tx_search` responses are paginated server-side. [`CometClient::tx_search`]
//! merges all pages automatically, bounded by
//! [`ClientConfig::max_tx_pages`](config::ClientConfig::max_tx_pages).

#![doc(html_root_url = "https://docs.rs/comet-rpc")]

// ═══════════════════════════════════════════════════════════════════════════════
// MODULES
// ═══════════════════════════════════════════════════════════════════════════════

pub mod client;
pub mod config;
pub mod error;
pub mod types;

// ═══════════════════════════════════════════════════════════════════════════════
// RE-EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

// Primary types - what most users need
pub use client::CometClient;
pub use config::ClientConfig;
pub use error::{CometError, Result};
pub use types::{
    AbciEvent, BlockResponse, BlockResultsResponse, EventAttribute, Status, TxResult,
    TxSearchResponse,
};

// ═══════════════════════════════════════════════════════════════════════════════
// CRATE INFO
// ═══════════════════════════════════════════════════════════════════════════════

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version string.
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
