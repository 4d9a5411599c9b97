//! Data storage layer
//!
//! - `types` - Event aggregate, derived records and classification enums
//! - `traits` - `EventRepository`, the only storage surface the pipeline sees
//! - `uow` - Per-event unit of work staged by extractors
//! - `memory` - In-process backend (default, used by tests)
//! - `sqlite` - Durable backend with schema-versioned migrations
//! - `error` - Unified error type for all backends

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;
pub mod types;
pub mod uow;

pub use error::DataError;
pub use memory::MemoryRepository;
pub use sqlite::SqliteRepository;
pub use traits::EventRepository;
pub use uow::{ChangeSet, SessionChange, UnitOfWork};

use std::sync::Arc;

use crate::core::config::{DatabaseBackend, DatabaseConfig};
use crate::utils::file::expand_path;

/// Event store service enum
///
/// Wraps the configured backend. Services are stored as Arc so the processor
/// can hold the repository while the app keeps the concrete handle for shutdown.
pub enum EventStore {
    /// Process memory (default)
    Memory(Arc<MemoryRepository>),
    /// SQLite file
    Sqlite(Arc<SqliteRepository>),
}

impl EventStore {
    /// Initialize the store based on configuration
    pub async fn init(config: &DatabaseConfig) -> Result<Self, DataError> {
        match config.backend {
            DatabaseBackend::Memory => {
                tracing::debug!("Using in-memory event store");
                Ok(Self::Memory(Arc::new(MemoryRepository::new())))
            }
            DatabaseBackend::Sqlite => {
                let path = expand_path(&config.sqlite_path);
                let repo = SqliteRepository::init(&path).await?;
                Ok(Self::Sqlite(Arc::new(repo)))
            }
        }
    }

    /// The backend behind the repository trait
    pub fn repository(&self) -> Arc<dyn EventRepository> {
        match self {
            Self::Memory(m) => Arc::clone(m) as Arc<dyn EventRepository>,
            Self::Sqlite(s) => Arc::clone(s) as Arc<dyn EventRepository>,
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Self::Memory(_) => DatabaseBackend::Memory,
            Self::Sqlite(_) => DatabaseBackend::Sqlite,
        }
    }

    /// Flush and close the backend
    pub async fn close(&self) {
        match self {
            Self::Memory(_) => {}
            Self::Sqlite(s) => {
                if let Err(e) = s.checkpoint().await {
                    tracing::warn!(error = %e, "WAL checkpoint on close failed");
                }
                s.close().await;
            }
        }
    }
}
