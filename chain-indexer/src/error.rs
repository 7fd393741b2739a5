//! Layered error types for the chain indexer.
//!
//! This module provides a hierarchical error system:
//!
//! - [`DomainError`] - Parse and decode failures (recoverable per height)
//! - [`InfraError`] - Infrastructure errors (database, node RPC, io)
//! - [`AppError`] - Application-level errors combining domain and infra
//!
//! # Error Philosophy
//!
//! - Domain errors mark a single height as failed; the pipeline continues
//! - Infrastructure errors are retried where the design allows, then fatal
//! - The `Result` type alias uses `AppError` for application code

use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain-level errors from parsing and decoding block data.
///
/// These errors mark a height (or one facet of it) as failed without
/// stopping the pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// A transaction's messages could not be decoded.
    #[error("message decode failed: {0}")]
    MessageDecode(String),

    /// A custom message parser rejected its input.
    #[error("message parser '{parser}' failed: {reason}")]
    MessageParse {
        /// Identifier of the failing parser.
        parser: String,
        /// What went wrong.
        reason: String,
    },

    /// A block lifecycle event could not be parsed.
    #[error("event parse failed for '{event_type}': {reason}")]
    EventParse {
        /// Type of the offending event.
        event_type: String,
        /// What went wrong.
        reason: String,
    },

    /// Block data was structurally invalid.
    #[error("malformed block: {0}")]
    MalformedBlock(String),

    /// The node returned data for a different height than requested.
    #[error("height mismatch: requested {requested}, node returned {returned}")]
    HeightMismatch {
        /// Height the worker asked for.
        requested: u64,
        /// Height present in the response.
        returned: u64,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// INFRASTRUCTURE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Infrastructure-level errors from external systems.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfraError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Remote node RPC error.
    #[error("node error: {0}")]
    Node(#[from] comet_rpc::CometError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Filesystem error (block input file, filter file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline channel closed while a sender still held work.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors combining domain and infrastructure errors.
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Infrastructure error.
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Setup failure before any worker started (invalid configuration,
    /// duplicate parser identifier, migration failure).
    #[error("setup error: {0}")]
    Setup(String),

    /// A store write failed twice for the same batch.
    #[error("store write failed twice for height {height} ({kind} batch)")]
    WriteRetryExhausted {
        /// Height of the batch that could not be committed.
        height: u64,
        /// Batch kind, `tx` or `event`.
        kind: &'static str,
    },

    /// The ratio of write reattempts to writes breached the health limit.
    #[error("db reattempt ratio too high: {reattempts}/{writes} exceeds 10%")]
    RetryRatioExceeded {
        /// Reattempted writes so far.
        reattempts: u64,
        /// Total writes so far.
        writes: u64,
    },

    /// A pipeline task panicked or was cancelled.
    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, AppError>;

// ═══════════════════════════════════════════════════════════════════════════════
// CONVENIENCE CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Infra(InfraError::Database(err))
    }
}

impl From<comet_rpc::CometError> for AppError {
    fn from(err: comet_rpc::CometError) -> Self {
        Self::Infra(InfraError::Node(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Infra(InfraError::Serialization(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Infra(InfraError::Io(err))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
