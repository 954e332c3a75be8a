//! Time-bucketed response cache
//!
//! Fetch results are memoized under a key made of a logical resource id and a
//! coarse time bucket (calendar date, hour, ISO week, or a constant). Requests
//! inside the same bucket are served from storage; once the bucket rolls over
//! the key changes and callers transparently refetch. Storage failures degrade
//! to "as if the cache did not exist".

mod bucket;
mod fetch;
mod manager;
mod storage;

pub use bucket::{compute_bucket, BucketMode, Clock, ParseBucketModeError, SystemClock, STATIC_BUCKET};
pub use fetch::{fetch_with_cache, refresh_with_cache};
pub use manager::{CacheConfig, CacheEntry, CacheError, TimeBucketedCache, KEY_SEPARATOR};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
