//! Command-line interface parsing for explorer-cache
//!
//! Parses arguments with clap and turns them into an [`AppConfig`], validating
//! the values clap cannot check on its own (chart names, bucket modes, offsets).

use std::path::PathBuf;

use chrono::FixedOffset;
use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::cache::{BucketMode, CacheConfig, ParseBucketModeError};
use crate::data::explorer::DEFAULT_API_URL;
use crate::data::ChartCacheKey;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified chart name is not recognized
    #[error("Invalid chart: '{0}'. Valid charts: transaction-count, address-count, total-difficulty")]
    InvalidChart(String),

    /// The specified bucket mode is not recognized
    #[error(transparent)]
    InvalidBucketMode(#[from] ParseBucketModeError),

    /// UTC offset outside the range real timezones use
    #[error("Invalid UTC offset: {0}. Expected hours between -12 and 14")]
    InvalidUtcOffset(i32),

    /// A cache capacity of zero would evict every write
    #[error("Invalid max entries: must be greater than zero")]
    InvalidMaxEntries,
}

/// Blockchain explorer client with a time-bucketed response cache
#[derive(Parser, Debug)]
#[command(name = "explorer-cache")]
#[command(about = "Explorer statistics and halving countdown with a time-bucketed cache")]
#[command(version)]
pub struct Cli {
    /// Directory for cache files (defaults to the XDG cache directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Explorer API base URL
    #[arg(long, value_name = "URL", global = true)]
    pub api_url: Option<String>,

    /// Hours east of UTC used for date buckets (e.g. 8 or -5)
    #[arg(long, value_name = "HOURS", global = true, allow_hyphen_values = true)]
    pub utc_offset: Option<i32>,

    /// Maximum number of cache entries; oldest are evicted first
    #[arg(long, value_name = "N", global = true)]
    pub max_entries: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print a daily statistic chart, fetching it at most once per day
    ///
    /// Valid charts: transaction-count, address-count, total-difficulty
    Chart {
        /// Chart name
        chart: String,
        /// Ignore today's cached series and fetch again
        #[arg(long)]
        refresh: bool,
    },
    /// Fetch every chart into the cache concurrently
    Warm,
    /// Halving countdown and acknowledgement
    Halving {
        #[command(subcommand)]
        action: HalvingCommand,
    },
    /// Inspect or maintain the cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum HalvingCommand {
    /// Show the halving banner state
    Status,
    /// Mark a halving as acknowledged
    Ack {
        /// Halving number (1 for the first halving)
        halving: u64,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
    /// Print the live value of a resource
    Get {
        /// Resource id (e.g. transaction-count)
        resource: String,
        /// Bucket mode: none, hour, date, week
        #[arg(long, default_value = "date")]
        mode: String,
    },
    /// Remove entries whose bucket has rolled over
    Prune,
    /// Print the number of stored entries
    Stats,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Cache directory override
    pub cache_dir: Option<PathBuf>,
    /// Explorer API base URL
    pub api_url: String,
    /// Timezone for calendar buckets
    pub timezone: FixedOffset,
    /// Cache capacity
    pub max_entries: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            api_url: DEFAULT_API_URL.to_string(),
            timezone: CacheConfig::default().timezone,
            max_entries: None,
        }
    }
}

impl AppConfig {
    /// Creates an AppConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(AppConfig)` with defaults filled in
    /// * `Err(CliError)` if an offset or capacity is out of range
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let mut config = AppConfig::default();

        if let Some(hours) = cli.utc_offset {
            config.timezone = parse_utc_offset(hours)?;
        }

        if let Some(max) = cli.max_entries {
            if max == 0 {
                return Err(CliError::InvalidMaxEntries);
            }
            config.max_entries = Some(max);
        }

        if let Some(url) = &cli.api_url {
            config.api_url = url.clone();
        }
        config.cache_dir = cli.cache_dir.clone();

        Ok(config)
    }

    /// Cache settings for this configuration
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            timezone: self.timezone,
            max_entries: self.max_entries,
        }
    }
}

/// Parses a chart name argument into a ChartCacheKey
pub fn parse_chart_arg(s: &str) -> Result<ChartCacheKey, CliError> {
    ChartCacheKey::from_str(s).ok_or_else(|| CliError::InvalidChart(s.to_string()))
}

/// Parses a bucket mode argument
pub fn parse_bucket_mode_arg(s: &str) -> Result<BucketMode, CliError> {
    Ok(s.parse::<BucketMode>()?)
}

fn parse_utc_offset(hours: i32) -> Result<FixedOffset, CliError> {
    if !(-12..=14).contains(&hours) {
        return Err(CliError::InvalidUtcOffset(hours));
    }
    FixedOffset::east_opt(hours * 3600).ok_or(CliError::InvalidUtcOffset(hours))
}
