//! Command execution for explorer-cache
//!
//! The cache is constructed once here from the startup configuration and
//! passed by reference to every consumer (charts, halving banner, cache
//! maintenance). Output goes to any `Write` so commands can be tested.

use std::io::{self, Write};

use chrono::Utc;
use futures::future::join_all;
use thiserror::Error;

use crate::cache::{FileStorage, MemoryStorage, TimeBucketedCache};
use crate::cli::{parse_bucket_mode_arg, parse_chart_arg, AppConfig, CacheCommand, CliError, Command, HalvingCommand};
use crate::data::{load_chart, ChartCacheKey, ExplorerClient, ExplorerError};
use crate::halving::{acknowledge, banner_state, load_halving_estimate};

/// Errors surfaced to the user by a command
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid argument value
    #[error(transparent)]
    Cli(#[from] CliError),

    /// Explorer API request failed
    #[error("Explorer request failed: {0}")]
    Explorer(#[from] ExplorerError),

    /// Writing output failed
    #[error("Output failed: {0}")]
    Io(#[from] io::Error),

    /// Cached value could not be printed
    #[error("Failed to format value: {0}")]
    Json(#[from] serde_json::Error),
}

/// Main application: configuration, the cache, and the API client
pub struct App {
    /// Startup configuration
    pub config: AppConfig,
    cache: TimeBucketedCache,
    client: ExplorerClient,
}

impl App {
    /// Creates an App with file-backed cache storage
    ///
    /// Falls back to in-memory storage when no cache directory can be
    /// determined; the application then simply fetches every time.
    pub fn new(config: AppConfig) -> Self {
        let storage = match &config.cache_dir {
            Some(dir) => Some(FileStorage::with_dir(dir.clone())),
            None => FileStorage::new(),
        };

        let cache = match storage {
            Some(storage) => TimeBucketedCache::new(storage),
            None => {
                tracing::warn!("no cache directory available, using in-memory cache");
                TimeBucketedCache::new(MemoryStorage::new())
            }
        }
        .with_config(config.cache_config());

        let client = ExplorerClient::new().with_base_url(config.api_url.clone());
        Self::with_parts(config, cache, client)
    }

    /// Creates an App from already constructed parts
    pub fn with_parts(config: AppConfig, cache: TimeBucketedCache, client: ExplorerClient) -> Self {
        Self {
            config,
            cache,
            client,
        }
    }

    pub fn cache(&self) -> &TimeBucketedCache {
        &self.cache
    }

    /// Runs a command, writing human-readable output to `out`
    pub async fn run<W: Write>(&self, command: &Command, out: &mut W) -> Result<(), AppError> {
        match command {
            Command::Chart { chart, refresh } => {
                let chart = parse_chart_arg(chart)?;
                self.print_chart(chart, *refresh, out).await
            }
            Command::Warm => self.warm(out).await,
            Command::Halving { action } => self.run_halving(action, out).await,
            Command::Cache { action } => self.run_cache(action, out),
        }
    }

    async fn print_chart<W: Write>(
        &self,
        chart: ChartCacheKey,
        refresh: bool,
        out: &mut W,
    ) -> Result<(), AppError> {
        let series = load_chart(&self.client, &self.cache, chart, refresh).await?;

        writeln!(out, "{}", chart.title())?;
        for point in series {
            writeln!(out, "{} {}", point.date, point.value)?;
        }
        Ok(())
    }

    /// Loads every chart concurrently; failures are reported per chart
    async fn warm<W: Write>(&self, out: &mut W) -> Result<(), AppError> {
        let results = join_all(
            ChartCacheKey::ALL
                .into_iter()
                .map(|chart| load_chart(&self.client, &self.cache, chart, false)),
        )
        .await;

        for (chart, result) in ChartCacheKey::ALL.into_iter().zip(results) {
            match result {
                Ok(series) => writeln!(out, "{}: {} points", chart.cache_key(), series.len())?,
                Err(e) => {
                    tracing::warn!(chart = chart.cache_key(), error = %e, "failed to warm chart");
                    writeln!(out, "{}: failed ({})", chart.cache_key(), e)?;
                }
            }
        }
        Ok(())
    }

    async fn run_halving<W: Write>(
        &self,
        action: &HalvingCommand,
        out: &mut W,
    ) -> Result<(), AppError> {
        match action {
            HalvingCommand::Status => {
                let now = Utc::now();
                let estimate = load_halving_estimate(&self.client, &self.cache, now).await?;
                writeln!(out, "{}", banner_state(&self.cache, &estimate, now))?;
            }
            HalvingCommand::Ack { halving } => {
                acknowledge(&self.cache, *halving);
                writeln!(out, "Halving {} acknowledged", halving)?;
            }
        }
        Ok(())
    }

    fn run_cache<W: Write>(&self, action: &CacheCommand, out: &mut W) -> Result<(), AppError> {
        match action {
            CacheCommand::Get { resource, mode } => {
                let mode = parse_bucket_mode_arg(mode)?;
                match self.cache.entry(resource, mode) {
                    Some(entry) => {
                        writeln!(out, "key: {}", entry.key)?;
                        writeln!(out, "stored_at: {}", entry.stored_at.to_rfc3339())?;
                        writeln!(out, "{}", serde_json::to_string_pretty(&entry.value)?)?;
                    }
                    None => writeln!(out, "miss: {}", self.cache.key_for(resource, mode))?,
                }
            }
            CacheCommand::Prune => {
                let removed = self.cache.prune_stale();
                writeln!(out, "Removed {} stale entries", removed)?;
            }
            CacheCommand::Stats => {
                writeln!(out, "{} entries", self.cache.len())?;
            }
        }
        Ok(())
    }
}
