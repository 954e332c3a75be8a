//! Fetch-through helpers used by data consumers
//!
//! The cache itself never fetches. These helpers implement the consumer side:
//! check the cache, call the fetch layer on a miss and write the result back
//! once it resolves. Fetch errors go straight back to the caller and leave the
//! cache untouched, so the next call retries naturally.

use std::future::Future;

use serde::{de::DeserializeOwned, Serialize};

use super::bucket::BucketMode;
use super::manager::TimeBucketedCache;

/// Returns the cached value for `resource`, fetching and caching it on a miss
pub async fn fetch_with_cache<T, E, F, Fut>(
    cache: &TimeBucketedCache,
    resource: &str,
    mode: BucketMode,
    fetch: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(cached) = cache.get::<T>(resource, mode) {
        return Ok(cached);
    }
    refresh_with_cache(cache, resource, mode, fetch).await
}

/// Fetches unconditionally and stores the result for `resource`
pub async fn refresh_with_cache<T, E, F, Fut>(
    cache: &TimeBucketedCache,
    resource: &str,
    mode: BucketMode,
    fetch: F,
) -> Result<T, E>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let value = fetch().await?;
    cache.set(resource, mode, &value);
    Ok(value)
}
