//! Daily statistic charts
//!
//! Each chart has a cache key, the API indicator it is fetched from and a
//! bucket mode. Daily charts only change once a day, so they are cached per
//! calendar date and refetched after midnight.

use chrono::{DateTime, FixedOffset};

use super::explorer::{ExplorerClient, ExplorerError};
use super::{ChartPoint, DailyStatistic};
use crate::cache::{fetch_with_cache, refresh_with_cache, BucketMode, TimeBucketedCache};

/// Charts backed by a daily statistic series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartCacheKey {
    TransactionCount,
    AddressCount,
    TotalDifficulty,
}

impl ChartCacheKey {
    /// All known charts
    pub const ALL: [ChartCacheKey; 3] = [
        ChartCacheKey::TransactionCount,
        ChartCacheKey::AddressCount,
        ChartCacheKey::TotalDifficulty,
    ];

    /// Resource id used in the cache
    pub fn cache_key(&self) -> &'static str {
        match self {
            ChartCacheKey::TransactionCount => "transaction-count",
            ChartCacheKey::AddressCount => "address-count",
            ChartCacheKey::TotalDifficulty => "total-difficulty",
        }
    }

    /// Statistic name in the API path and response attributes
    pub fn indicator(&self) -> &'static str {
        match self {
            ChartCacheKey::TransactionCount => "transactions_count",
            ChartCacheKey::AddressCount => "addresses_count",
            ChartCacheKey::TotalDifficulty => "total_difficulties_for_the_last_day",
        }
    }

    pub fn bucket_mode(&self) -> BucketMode {
        BucketMode::Date
    }

    /// Human-readable chart title
    pub fn title(&self) -> &'static str {
        match self {
            ChartCacheKey::TransactionCount => "Transaction Count",
            ChartCacheKey::AddressCount => "Unique Addresses Used",
            ChartCacheKey::TotalDifficulty => "Total Difficulty",
        }
    }

    /// Parses a chart name as accepted on the command line
    ///
    /// Accepts the cache key (`transaction-count`) and the API indicator
    /// (`transactions_count`).
    pub fn from_str(s: &str) -> Option<Self> {
        let name = s.trim().to_lowercase();
        ChartCacheKey::ALL
            .into_iter()
            .find(|chart| chart.cache_key() == name || chart.indicator() == name)
    }
}

/// Converts a raw series into plottable points
///
/// Dates are taken from the unix timestamp in `tz`, without time of day.
/// Entries with an invalid timestamp or a non-numeric value are skipped.
pub fn to_series(statistics: &[DailyStatistic], tz: FixedOffset) -> Vec<ChartPoint> {
    statistics
        .iter()
        .filter_map(|stat| {
            let date = DateTime::from_timestamp(stat.created_at_unixtimestamp, 0)?
                .with_timezone(&tz)
                .date_naive();
            let value = stat.value.parse::<f64>().ok()?;
            Some(ChartPoint { date, value })
        })
        .collect()
}

/// Loads a chart through the cache, fetching on a miss
///
/// With `refresh` set the cached series is ignored and overwritten.
pub async fn load_chart(
    client: &ExplorerClient,
    cache: &TimeBucketedCache,
    chart: ChartCacheKey,
    refresh: bool,
) -> Result<Vec<ChartPoint>, ExplorerError> {
    let fetch = || client.fetch_daily_statistic(chart.indicator());
    let statistics = if refresh {
        refresh_with_cache(cache, chart.cache_key(), chart.bucket_mode(), fetch).await?
    } else {
        fetch_with_cache(cache, chart.cache_key(), chart.bucket_mode(), fetch).await?
    };
    Ok(to_series(&statistics, cache.config().timezone))
}
