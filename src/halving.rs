//! Halving countdown and acknowledgement state
//!
//! The issuance halves every [`EPOCHS_PER_HALVING`] epochs. The next halving
//! date is estimated from the current epoch position and the average epoch
//! duration. Once a halving has happened the banner celebrates it until the
//! user acknowledges it; the acknowledgement is a flag in the cache stored with
//! [`BucketMode::None`] so it never expires.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

use crate::cache::{fetch_with_cache, BucketMode, TimeBucketedCache};
use crate::data::{EpochInfo, ExplorerClient, ExplorerError, Statistics};

/// Number of epochs between two halvings
pub const EPOCHS_PER_HALVING: u64 = 8760;

/// Cache resource for chain statistics; refreshed hourly
pub const STATISTICS_CACHE_KEY: &str = "statistics";

/// Estimated position and date of the next halving
#[derive(Debug, Clone, PartialEq)]
pub struct HalvingEstimate {
    /// 1-based number of the upcoming halving
    pub next_halving_count: u64,
    /// Epoch at which the upcoming halving happens
    pub target_epoch: u64,
    /// Estimated wall-clock time of the upcoming halving
    pub estimated_date: DateTime<Utc>,
}

impl HalvingEstimate {
    /// Estimates the next halving from the current epoch position
    ///
    /// An epoch time too large to represent pushes the estimate to the latest
    /// representable instant.
    pub fn from_epoch(epoch: &EpochInfo, epoch_time_ms: f64, now: DateTime<Utc>) -> Self {
        let next_halving_count = epoch.epoch_number / EPOCHS_PER_HALVING + 1;
        let target_epoch = next_halving_count * EPOCHS_PER_HALVING;

        let progress = if epoch.epoch_length == 0 {
            0.0
        } else {
            (epoch.index as f64 / epoch.epoch_length as f64).min(1.0)
        };
        let remaining_epochs = (target_epoch - epoch.epoch_number) as f64 - progress;
        let remaining_ms = remaining_epochs * epoch_time_ms.max(0.0);

        let estimated_date = if remaining_ms.is_finite() {
            Duration::try_milliseconds(remaining_ms.round() as i64)
                .and_then(|remaining| now.checked_add_signed(remaining))
        } else {
            None
        }
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            next_halving_count,
            target_epoch,
            estimated_date,
        }
    }

    /// Previous halving number, if any halving has happened yet
    pub fn last_halving(&self) -> Option<u64> {
        (self.next_halving_count > 1).then(|| self.next_halving_count - 1)
    }
}

/// Time left until a target instant, split into display units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    /// Countdown from `now` to `target`; all zero once the target has passed
    pub fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let total = (target - now).num_seconds().max(0);
        Self {
            days: total / 86_400,
            hours: total % 86_400 / 3_600,
            minutes: total % 3_600 / 60,
            seconds: total % 60,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.days == 0 && self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }

    /// Largest non-zero unit, e.g. `"3 days"`, or `"Halving!"` when finished
    pub fn short_label(&self) -> String {
        if self.days > 0 {
            format!("{} days", self.days)
        } else if self.hours > 0 {
            format!("{} hours", self.hours)
        } else if self.minutes > 0 {
            format!("{} minutes", self.minutes)
        } else if self.seconds > 0 {
            format!("{} seconds", self.seconds)
        } else {
            "Halving!".to_string()
        }
    }
}

/// English ordinal for a halving number
///
/// The first two halvings are spelled out; later ones use a numeric suffix.
/// 11, 12 and 13 (mod 100) take `th`, as in "111th".
pub fn ordinal(n: u64) -> String {
    match n {
        1 => return "first".to_string(),
        2 => return "second".to_string(),
        _ => {}
    }

    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Cache resource marking halving `n` as acknowledged
pub fn acknowledgement_key(n: u64) -> String {
    format!("halving-acknowledged-{}", n)
}

/// Marks halving `n` as acknowledged so its celebration is no longer shown
pub fn acknowledge(cache: &TimeBucketedCache, n: u64) {
    cache.set(&acknowledgement_key(n), BucketMode::None, &true);
}

/// Whether halving `n` has been acknowledged
pub fn is_acknowledged(cache: &TimeBucketedCache, n: u64) -> bool {
    cache.has(&acknowledgement_key(n), BucketMode::None)
}

/// What the halving banner should show
#[derive(Debug, Clone, PartialEq)]
pub enum BannerState {
    /// A halving happened and has not been acknowledged yet
    Celebrating { halving: u64 },
    /// Counting down to the next halving
    Countdown {
        next_halving: u64,
        estimated_date: DateTime<Utc>,
        countdown: Countdown,
    },
}

/// Decides the banner state from the estimate and the acknowledgement flags
pub fn banner_state(
    cache: &TimeBucketedCache,
    estimate: &HalvingEstimate,
    now: DateTime<Utc>,
) -> BannerState {
    match estimate.last_halving() {
        Some(last) if !is_acknowledged(cache, last) => BannerState::Celebrating { halving: last },
        _ => BannerState::Countdown {
            next_halving: estimate.next_halving_count,
            estimated_date: estimate.estimated_date,
            countdown: Countdown::until(estimate.estimated_date, now),
        },
    }
}

impl fmt::Display for BannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BannerState::Celebrating { halving } => write!(
                f,
                "CONGRATULATIONS ON THE {} HALVING!",
                ordinal(*halving).to_uppercase()
            ),
            BannerState::Countdown {
                next_halving,
                estimated_date,
                countdown,
            } => write!(
                f,
                "{} halving countdown: {} (estimated {})",
                ordinal(*next_halving),
                countdown.short_label(),
                estimated_date.format("%Y-%m-%d %H:%M UTC")
            ),
        }
    }
}

/// Fetches chain statistics through the cache and estimates the next halving
pub async fn load_halving_estimate(
    client: &ExplorerClient,
    cache: &TimeBucketedCache,
    now: DateTime<Utc>,
) -> Result<HalvingEstimate, ExplorerError> {
    let statistics: Statistics = fetch_with_cache(cache, STATISTICS_CACHE_KEY, BucketMode::Hour, || {
        client.fetch_statistics()
    })
    .await?;

    Ok(HalvingEstimate::from_epoch(
        &statistics.epoch_info,
        statistics.estimated_epoch_time_ms,
        now,
    ))
}
