//! Explorer data models
//!
//! Types returned by the explorer API client and cached by the application.
//! Everything here is `Serialize + Deserialize` so it can round-trip through
//! the time-bucketed cache.

pub mod chart;
pub mod explorer;

pub use chart::{load_chart, to_series, ChartCacheKey};
pub use explorer::{ExplorerClient, ExplorerError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One day of a daily statistic series as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatistic {
    /// Start of the day, unix seconds
    pub created_at_unixtimestamp: i64,
    /// Statistic value as a decimal string (may exceed f64 precision)
    pub value: String,
}

/// A chart point ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    /// Day the value belongs to
    pub date: NaiveDate,
    /// Value converted for plotting
    pub value: f64,
}

/// Current epoch position of the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    /// Current epoch number
    pub epoch_number: u64,
    /// Number of blocks in the current epoch
    pub epoch_length: u64,
    /// Index of the tip block inside the current epoch
    pub index: u64,
}

/// Chain-wide statistics needed for halving estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub epoch_info: EpochInfo,
    /// Estimated duration of one epoch in milliseconds
    pub estimated_epoch_time_ms: f64,
}
