//! Core application

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{DEFAULT_LOG_FILTER, ENV_LOG};
use crate::data::{DataError, EventStore};
use crate::data::types::{Event, RecordCounts};
use crate::domain::extract::{BatchReport, EventProcessor, default_registry};

/// Outcome of the `process` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileReport {
    /// Lines that did not parse as an event, or whose event id was taken
    pub rejected: usize,
    pub batch: BatchReport,
}

pub struct CoreApp {
    pub config: AppConfig,
    pub store: EventStore,
    pub processor: Arc<EventProcessor>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config).await?;
        let result = app.execute(command).await;
        app.store.close().await;
        result
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        Self::with_config(config).await
    }

    /// Build the store, registry and processor for `config`
    pub async fn with_config(config: AppConfig) -> Result<Self> {
        let store = EventStore::init(&config.database)
            .await
            .with_context(|| format!("Failed to open {} event store", config.database.backend))?;

        let registry = Arc::new(default_registry());
        tracing::debug!(extractors = ?registry.names(), "Extractors registered");

        let processor = Arc::new(EventProcessor::new(
            registry,
            store.repository(),
            config.processing.commit_timeout(),
        ));

        Ok(Self {
            config,
            store,
            processor,
        })
    }

    async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Process { file, sequential } => {
                let report = self.process_file(&file, sequential).await?;
                println!(
                    "processed={} skipped={} failed={} extractor_errors={} rejected_lines={}",
                    report.batch.processed,
                    report.batch.skipped,
                    report.batch.failed,
                    report.batch.extractor_errors,
                    report.rejected
                );
            }
            Commands::Sweep => {
                let batch = self.sweep().await?;
                println!(
                    "processed={} skipped={} failed={} extractor_errors={}",
                    batch.processed, batch.skipped, batch.failed, batch.extractor_errors
                );
            }
            Commands::Stats => {
                let counts = self.stats().await?;
                println!("{}", serde_json::to_string_pretty(&counts)?);
            }
        }
        Ok(())
    }

    /// Stage every event in a JSON Lines file, then process them
    pub async fn process_file(&self, path: &Path, sequential: bool) -> Result<FileReport> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read events file: {}", path.display()))?;

        let repo = self.store.repository();
        let mut events = Vec::new();
        let mut rejected = 0;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event = match serde_json::from_str::<Event>(line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(line = index + 1, error = %e, "Skipping malformed event line");
                    rejected += 1;
                    continue;
                }
            };
            match repo.stage_event(event).await {
                Ok(event) => events.push(event),
                Err(DataError::Conflict(reason)) => {
                    tracing::warn!(line = index + 1, %reason, "Skipping event that is already staged");
                    rejected += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(staged = events.len(), rejected, path = %path.display(), "Events staged");

        let batch = if sequential {
            self.processor.process_events(&mut events).await
        } else {
            self.processor
                .process_events_concurrent(events, self.config.processing.concurrency)
                .await
        };

        Ok(FileReport { rejected, batch })
    }

    /// Process unprocessed events in rounds of `batch_size` until none remain.
    ///
    /// Stops early when a round makes no progress, since events whose commit
    /// keeps failing stay unprocessed.
    pub async fn sweep(&self) -> Result<BatchReport> {
        let repo = self.store.repository();
        let mut total = BatchReport::default();

        loop {
            let events = repo
                .list_unprocessed(self.config.processing.batch_size)
                .await
                .context("Failed to list unprocessed events")?;
            if events.is_empty() {
                break;
            }

            let round = self
                .processor
                .process_events_concurrent(events, self.config.processing.concurrency)
                .await;
            total.merge(round);

            if round.processed + round.skipped == 0 {
                tracing::warn!(failed = round.failed, "Sweep round made no progress, stopping");
                break;
            }
        }

        Ok(total)
    }

    pub async fn stats(&self) -> Result<RecordCounts> {
        self.store
            .repository()
            .record_counts()
            .await
            .context("Failed to count records")
    }

    fn init_logging() {
        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}
