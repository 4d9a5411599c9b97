use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::DatabaseBackend;
use super::constants::{
    ENV_BATCH_SIZE, ENV_COMMIT_TIMEOUT_MS, ENV_CONCURRENCY, ENV_CONFIG, ENV_DB_BACKEND,
    ENV_SQLITE_PATH,
};

#[derive(Parser)]
#[command(name = "agentwatch")]
#[command(version, about = "Telemetry extraction for AI agents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    // Database options
    /// Event store backend (memory or sqlite)
    #[arg(long, global = true, env = ENV_DB_BACKEND, value_parser = parse_database_backend)]
    pub db_backend: Option<DatabaseBackend>,

    /// SQLite database path (when using the sqlite backend)
    #[arg(long, global = true, env = ENV_SQLITE_PATH)]
    pub sqlite_path: Option<String>,

    // Processing options
    /// Deadline for committing one event, in milliseconds
    #[arg(long, global = true, env = ENV_COMMIT_TIMEOUT_MS)]
    pub commit_timeout_ms: Option<u64>,

    /// Events processed in parallel by batch commands
    #[arg(long, global = true, env = ENV_CONCURRENCY)]
    pub concurrency: Option<usize>,

    /// Unprocessed events fetched per sweep round
    #[arg(long, global = true, env = ENV_BATCH_SIZE)]
    pub batch_size: Option<usize>,
}

/// Parse database backend from CLI/env string
fn parse_database_backend(s: &str) -> Result<DatabaseBackend, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(DatabaseBackend::Memory),
        "sqlite" => Ok(DatabaseBackend::Sqlite),
        _ => Err(format!(
            "Invalid database backend '{}'. Valid options: memory, sqlite",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Stage events from a JSON Lines file and process them
    Process {
        /// One event object per line
        file: PathBuf,

        /// Process one event at a time instead of in parallel
        #[arg(long)]
        sequential: bool,
    },
    /// Process every unprocessed event already in the store
    Sweep,
    /// Print event and derived-record counts
    Stats,
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub db_backend: Option<DatabaseBackend>,
    pub sqlite_path: Option<String>,
    pub commit_timeout_ms: Option<u64>,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        db_backend: cli.db_backend,
        sqlite_path: cli.sqlite_path,
        commit_timeout_ms: cli.commit_timeout_ms,
        concurrency: cli.concurrency,
        batch_size: cli.batch_size,
    };
    (config, cli.command)
}
