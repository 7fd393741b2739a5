//! Configuration loading and validation.
//!
//! Settings are loaded from TOML files and `INDEXER_`-prefixed environment
//! variables, validated as a whole, and normalized (boundary coercions such
//! as `start_block = 0` → 1) before the pipeline sees them.

mod settings;

pub use settings::{
    ChainSettings, DatabaseSettings, IndexerSettings, LoggingSettings, RpcSettings, Settings,
    DEFAULT_RPC_WORKERS, MAX_RPC_WORKERS,
};
