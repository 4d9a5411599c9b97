// =============================================================================
// Application Identity
// =============================================================================

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".agentwatch";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "agentwatch.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "AGENTWATCH_CONFIG";

// =============================================================================
// Environment Variables - Logging
// =============================================================================

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "AGENTWATCH_LOG";

/// Filter used when neither `AGENTWATCH_LOG` nor `RUST_LOG` is set
pub const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn";

// =============================================================================
// Environment Variables - Database
// =============================================================================

/// Environment variable for the storage backend (`memory` or `sqlite`)
pub const ENV_DB_BACKEND: &str = "AGENTWATCH_DB_BACKEND";

/// Environment variable for the SQLite database path
pub const ENV_SQLITE_PATH: &str = "AGENTWATCH_SQLITE_PATH";

// =============================================================================
// Environment Variables - Processing
// =============================================================================

/// Environment variable for the per-event commit deadline
pub const ENV_COMMIT_TIMEOUT_MS: &str = "AGENTWATCH_COMMIT_TIMEOUT_MS";

/// Environment variable for the number of events processed in parallel
pub const ENV_CONCURRENCY: &str = "AGENTWATCH_CONCURRENCY";

/// Environment variable for the sweep batch size
pub const ENV_BATCH_SIZE: &str = "AGENTWATCH_BATCH_SIZE";

// =============================================================================
// Processing Defaults
// =============================================================================

/// Default deadline for committing one event's unit of work
pub const DEFAULT_COMMIT_TIMEOUT_MS: u64 = 5_000;

/// Default number of events processed in parallel by batch commands
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default number of unprocessed events fetched per sweep round
pub const DEFAULT_BATCH_SIZE: usize = 500;

// =============================================================================
// SQLite Configuration
// =============================================================================

/// SQLite database filename (inside the dot folder)
pub const SQLITE_DB_FILENAME: &str = "agentwatch.db";

/// Maximum connections in the pool
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// Busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Page cache size (negative = KiB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// Pages between automatic WAL checkpoints
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";
