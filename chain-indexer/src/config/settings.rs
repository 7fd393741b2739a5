//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! environment variables or configuration files.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default number of RPC fetch workers.
pub const DEFAULT_RPC_WORKERS: usize = 4;

/// Maximum number of RPC fetch workers.
pub const MAX_RPC_WORKERS: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// SETTINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Identity of the indexed chain.
    pub chain: ChainSettings,
    /// Remote node RPC configuration.
    pub rpc: RpcSettings,
    /// Database configuration.
    pub database: DatabaseSettings,
    /// Pipeline behavior.
    pub indexer: IndexerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `INDEXER_` prefix
    ///
    /// # Arguments
    /// * `environment` - Environment name (e.g., "development", "production")
    ///
    /// # Errors
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("chain.chain_id", "")?
            .set_default("chain.chain_name", "")?
            .set_default("chain.account_prefix", "cosmos")?
            .set_default("rpc.url", "http://localhost:26657")?
            .set_default("rpc.workers", DEFAULT_RPC_WORKERS as i64)?
            .set_default("rpc.poll_interval_ms", 5000)?
            .set_default("rpc.request_timeout_ms", 30000)?
            .set_default("rpc.tx_page_size", 100)?
            .set_default("database.url", "postgres://localhost/indexer")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout_ms", 5000)?
            .set_default("database.idle_timeout_ms", 600_000)?
            .set_default("indexer.start_block", 1)?
            .set_default("indexer.end_block", Option::<i64>::None)?
            .set_default("indexer.block_input_file", Option::<String>::None)?
            .set_default("indexer.reindex_message_type", Option::<String>::None)?
            .set_default("indexer.filter_file", Option::<String>::None)?
            .set_default("indexer.dry_run", false)?
            .set_default("indexer.block_timer", 0)?
            .set_default("indexer.index_transactions", true)?
            .set_default("indexer.index_block_events", true)?
            .set_default("indexer.wait_for_chain", false)?
            .set_default("indexer.wait_for_chain_delay_secs", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.pretty", false)?
            .set_default("logging.file_path", Option::<String>::None)?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (INDEXER_ prefix)
            .add_source(
                Environment::with_prefix("INDEXER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Apply boundary coercions, returning normalized settings.
    ///
    /// - `indexer.start_block = 0` is coerced to 1 (heights start at 1)
    /// - `rpc.workers = 0` is coerced to the default
    /// - `rpc.workers > 64` is clamped to 64
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.indexer.start_block == 0 {
            self.indexer.start_block = 1;
        }
        if self.rpc.workers == 0 {
            self.rpc.workers = DEFAULT_RPC_WORKERS;
        } else if self.rpc.workers > MAX_RPC_WORKERS {
            self.rpc.workers = MAX_RPC_WORKERS;
        }
        self
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Chain validation
        if self.chain.chain_id.is_empty() {
            errors.push("chain.chain_id cannot be empty".into());
        }

        // RPC validation
        if self.rpc.url.is_empty() {
            errors.push("rpc.url cannot be empty".into());
        }
        if self.rpc.tx_page_size == 0 {
            errors.push("rpc.tx_page_size must be non-zero".into());
        }

        // Database validation
        if self.database.url.is_empty() {
            errors.push("database.url cannot be empty".into());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be non-zero".into());
        }
        if self.database.min_connections > self.database.max_connections {
            errors.push("database.min_connections cannot exceed max_connections".into());
        }

        // Indexer validation
        if self.indexer.reindex_message_type.is_some() && self.indexer.block_input_file.is_some() {
            errors.push(
                "indexer.reindex_message_type and indexer.block_input_file are mutually exclusive"
                    .into(),
            );
        }
        if let Some(end) = self.indexer.end_block {
            if end < self.indexer.start_block && self.indexer.start_block > 0 {
                errors.push("indexer.end_block cannot be below start_block".into());
            }
        }
        if !self.indexer.index_transactions && !self.indexer.index_block_events {
            errors.push(
                "at least one of indexer.index_transactions and indexer.index_block_events must be enabled"
                    .into(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Identity of the indexed chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    /// Chain id as reported by the node (e.g. `cosmoshub-4`).
    pub chain_id: String,
    /// Human-readable chain name used in failure records.
    pub chain_name: String,
    /// Bech32 account prefix for address rendering.
    pub account_prefix: String,
}

/// Remote node RPC configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcSettings {
    /// HTTP RPC endpoint URL (usually port 26657).
    pub url: String,
    /// Number of parallel fetch workers (clamped to 1-64).
    pub workers: usize,
    /// Tip polling interval in milliseconds (follow-the-tip mode).
    pub poll_interval_ms: u64,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Transactions per `tx_search` page.
    pub tx_page_size: usize,
}

impl RpcSettings {
    /// Get the polling interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum connections in the pool.
    pub max_connections: u32,
    /// Minimum connections to maintain.
    pub min_connections: u32,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Idle connection timeout in milliseconds.
    pub idle_timeout_ms: u64,
}

impl DatabaseSettings {
    /// Get the connection timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get the idle timeout as a `Duration`.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Pipeline behavior configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSettings {
    /// First height to index (0 is coerced to 1).
    pub start_block: u64,
    /// Last height to index. `None` follows the chain tip indefinitely.
    pub end_block: Option<u64>,
    /// Newline-delimited file of heights to index instead of a range.
    pub block_input_file: Option<String>,
    /// Reindex only heights that contained this message type.
    pub reindex_message_type: Option<String>,
    /// Path to a JSON filter file merged with programmatic registrations.
    pub filter_file: Option<String>,
    /// Run the full pipeline without issuing store writes.
    pub dry_run: bool,
    /// Log throughput and check write health every N blocks (0 disables).
    pub block_timer: u64,
    /// Whether to index transactions and their messages.
    pub index_transactions: bool,
    /// Whether to index begin/end block events.
    pub index_block_events: bool,
    /// Wait for the node to finish catching up before indexing.
    pub wait_for_chain: bool,
    /// Delay between catch-up polls, in seconds.
    pub wait_for_chain_delay_secs: u64,
}

impl IndexerSettings {
    /// Get the catch-up poll delay as a `Duration`.
    #[must_use]
    pub const fn wait_for_chain_delay(&self) -> Duration {
        Duration::from_secs(self.wait_for_chain_delay_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Human-readable output instead of JSON.
    pub pretty: bool,
    /// Optional file path for log output.
    pub file_path: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
