//! Chain Indexer CLI
//!
//! Entry point for the indexer binary. Provides subcommands for:
//! - `index` - Run the indexing pipeline
//! - `migrate` - Run database migrations
//! - `version` - Show version information
//!
//! # Usage
//!
//! ```bash
//! # Run with the development config
//! chain-indexer index
//!
//! # Run against the production config with a bounded range
//! INDEXER_INDEXER__START_BLOCK=1 INDEXER_INDEXER__END_BLOCK=100000 \
//!     chain-indexer --environment production index
//!
//! # Dry run (no store writes)
//! INDEXER_INDEXER__DRY_RUN=true chain-indexer index
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use comet_rpc::{ClientConfig, CometClient};
use eyre::{eyre, WrapErr};
use tracing::{error, info};

use chain_indexer::config::{LoggingSettings, Settings};
use chain_indexer::parsers::FilterFile;
use chain_indexer::pipeline::{Pipeline, PipelineBuilder};
use chain_indexer::store::PostgresStore;

// ═══════════════════════════════════════════════════════════════════════════════
// CLI ARGUMENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Chain Indexer - drains a CometBFT chain into PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "chain-indexer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Environment name selecting config/{environment}.toml
    #[arg(short, long, env = "INDEXER_ENVIRONMENT", default_value = "development")]
    environment: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the indexing pipeline
    Index,

    /// Run database migrations
    Migrate,

    /// Show version information
    Version,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("chain-indexer {}", chain_indexer::VERSION);
        return Ok(());
    }

    let settings = Settings::load(&cli.environment)
        .wrap_err_with(|| format!("Failed to load config for environment '{}'", cli.environment))?
        .normalized();

    // The guard flushes the file appender on exit; keep it alive
    let _log_guard = init_logging(&settings.logging)?;

    settings.validate().map_err(|errors| {
        eyre!(
            "invalid configuration:\n  - {}",
            errors.join("\n  - ")
        )
    })?;

    info!(
        version = chain_indexer::VERSION,
        environment = %cli.environment,
        chain_id = %settings.chain.chain_id,
        "Starting chain-indexer"
    );

    match cli.command {
        Commands::Index => run_index(settings).await,
        Commands::Migrate => run_migrate(settings).await,
        Commands::Version => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SUBCOMMANDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Assemble and run the pipeline until it drains or a shutdown signal
/// arrives.
async fn run_index(settings: Settings) -> eyre::Result<()> {
    let store = PostgresStore::connect(&settings.database)
        .await
        .wrap_err("Failed to connect to the database")?;

    let client_config = ClientConfig::default()
        .with_timeout(settings.rpc.request_timeout())
        .with_tx_page_size(settings.rpc.tx_page_size);
    let node = CometClient::with_config(&settings.rpc.url, client_config)
        .wrap_err("Failed to create the node client")?;

    let mut builder = PipelineBuilder::new();
    if let Some(path) = &settings.indexer.filter_file {
        let file = FilterFile::load(path)
            .wrap_err_with(|| format!("Failed to load filter file '{path}'"))?;
        info!(path = %path, empty = file.is_empty(), "Filter file loaded");
        builder = builder.with_filter_file(&file);
    }
    let config = builder.build();

    let pipeline = Pipeline::new(settings, Arc::new(node), Arc::new(store), config);

    tokio::select! {
        result = pipeline.run() => {
            let summary = result?;
            info!(
                blocks = summary.blocks_indexed,
                db_writes = summary.db_writes,
                db_reattempts = summary.db_reattempts,
                "Indexing complete"
            );
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            // In-flight store transactions are atomic, so stopping here
            // cannot leave a half-written batch
            info!("Shutdown signal received, stopping");
        }
    }

    Ok(())
}

/// Apply pending schema migrations.
async fn run_migrate(settings: Settings) -> eyre::Result<()> {
    let store = PostgresStore::connect(&settings.database)
        .await
        .wrap_err("Failed to connect to the database")?;
    store
        .run_migrations()
        .await
        .wrap_err("Migrations failed")?;
    info!("Migrations applied");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// INITIALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Initialize the tracing subscriber for logging.
///
/// Returns the file appender guard when a log file is configured.
fn init_logging(
    logging: &LoggingSettings,
) -> eyre::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .wrap_err_with(|| format!("invalid log level '{}'", logging.level))?;

    if let Some(path) = &logging.file_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("cannot open log file '{path}'"))?;
        let (writer, guard) = tracing_appender::non_blocking(file);

        if logging.pretty {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
        } else {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        }
        return Ok(Some(guard));
    }

    if logging.pretty {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    }
    Ok(None)
}
