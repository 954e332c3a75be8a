//! Time-bucketed cache over a raw key-value storage
//!
//! Values are stored under `"<resource>-<bucket>"` where the bucket is derived
//! from the current time and a [`BucketMode`]. A value stays readable until the
//! bucket rolls over; after that the key changes and the old entry is never read
//! again (it is pruned the next time the same resource is written).
//!
//! The cache is an optimization, not a source of truth: every storage or
//! serialization failure is logged and turned into a miss or a no-op.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::bucket::{compute_bucket, BucketMode, Clock, SystemClock};
use super::storage::{Storage, StorageError};

/// Separator between the resource id and the bucket discriminator
pub const KEY_SEPARATOR: char = '-';

/// Errors raised internally while reading or writing entries
///
/// Never surfaced by the public `get`/`set`/`has` surface.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying storage failed
    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Value or entry could not be encoded or decoded
    #[error("Serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A stored cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Composite key (`<resource>-<bucket>`)
    pub key: String,
    /// Logical resource id the key was built from
    pub resource: String,
    /// Bucket mode the key was built with
    pub mode: BucketMode,
    /// Cached payload
    pub value: Value,
    /// When the entry was written
    pub stored_at: DateTime<Utc>,
}

/// Cache settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Timezone used to compute calendar buckets
    pub timezone: FixedOffset,
    /// Maximum number of stored entries; oldest `stored_at` is evicted first
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            timezone: Utc.fix(),
            max_entries: None,
        }
    }
}

/// Memoizes fetch results keyed by resource id and time bucket
pub struct TimeBucketedCache {
    storage: Box<dyn Storage>,
    clock: Box<dyn Clock>,
    config: CacheConfig,
}

impl TimeBucketedCache {
    /// Creates a cache over `storage` using the system clock and UTC buckets
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            clock: Box::new(SystemClock),
            config: CacheConfig::default(),
        }
    }

    /// Replaces the clock used to compute buckets and `stored_at`
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Sets the timezone used for calendar buckets
    pub fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.config.timezone = timezone;
        self
    }

    /// Caps the number of stored entries
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.config.max_entries = Some(max_entries);
        self
    }

    /// Applies a whole [`CacheConfig`]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the composite key for `resource` in the current bucket
    pub fn key_for(&self, resource: &str, mode: BucketMode) -> String {
        let bucket = compute_bucket(self.clock.now(), mode, self.config.timezone);
        format!("{}{}{}", resource, KEY_SEPARATOR, bucket)
    }

    /// Returns the live value for `resource`, or `None` on a miss
    ///
    /// A miss covers: never written, bucket advanced, storage failure, and a
    /// value that no longer decodes as `T`. Never fetches.
    pub fn get<T: DeserializeOwned>(&self, resource: &str, mode: BucketMode) -> Option<T> {
        let key = self.key_for(resource, mode);
        match self.load(&key).and_then(|entry| match entry {
            Some(entry) => Ok(Some(serde_json::from_value(entry.value)?)),
            None => Ok(None),
        }) {
            Ok(Some(value)) => {
                tracing::debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores `value` for `resource` in the current bucket, overwriting any prior value
    ///
    /// Failures are logged and swallowed. After a failed write no value is
    /// readable for the key.
    pub fn set<T: Serialize + ?Sized>(&self, resource: &str, mode: BucketMode, value: &T) {
        let key = self.key_for(resource, mode);
        match self.store(&key, resource, mode, value) {
            Ok(()) => {
                tracing::debug!(key = %key, "cache write");
                self.prune_after_write(&key, resource, mode);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache write failed, ignoring");
                if let Err(e) = self.storage.remove_raw(&key) {
                    tracing::warn!(key = %key, error = %e, "failed to drop previous entry");
                }
            }
        }
    }

    /// Whether a live value exists for `resource`
    pub fn has(&self, resource: &str, mode: BucketMode) -> bool {
        self.get::<Value>(resource, mode).is_some()
    }

    /// Returns the live entry with its metadata
    pub fn entry(&self, resource: &str, mode: BucketMode) -> Option<CacheEntry> {
        let key = self.key_for(resource, mode);
        self.load(&key)
            .map_err(|e| tracing::warn!(key = %key, error = %e, "cache read failed"))
            .ok()
            .flatten()
    }

    /// Number of stored entries, including stale ones not yet pruned
    pub fn len(&self) -> usize {
        self.storage.keys().map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry that is not in its resource's current bucket
    ///
    /// Undecodable entries are removed too. Returns the number of entries removed.
    pub fn prune_stale(&self) -> usize {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list cache keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            let stale = match self.load(&key) {
                Ok(Some(entry)) => self.key_for(&entry.resource, entry.mode) != key,
                Ok(None) => false,
                Err(CacheError::Serialization(_)) => true,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cache read failed during prune");
                    false
                }
            };
            if stale && self.remove(&key) {
                removed += 1;
            }
        }
        removed
    }

    fn load(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let Some(raw) = self.storage.read_raw(key)? else {
            return Ok(None);
        };
        let entry: CacheEntry = serde_json::from_str(&raw)?;
        // Guards against a backend handing back a different key's content
        if entry.key != key {
            return Ok(None);
        }
        Ok(Some(entry))
    }

    fn store<T: Serialize + ?Sized>(
        &self,
        key: &str,
        resource: &str,
        mode: BucketMode,
        value: &T,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.to_string(),
            resource: resource.to_string(),
            mode,
            value: serde_json::to_value(value)?,
            stored_at: self.clock.now(),
        };
        let raw = serde_json::to_string(&entry)?;
        self.storage.write_raw(key, &raw)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> bool {
        match self.storage.remove_raw(key) {
            Ok(()) => {
                tracing::debug!(key = %key, "cache entry removed");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to remove cache entry");
                false
            }
        }
    }

    /// Drops older buckets of the same resource, then enforces the capacity
    fn prune_after_write(&self, current: &str, resource: &str, mode: BucketMode) {
        let keys = match self.storage.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list cache keys for pruning");
                return;
            }
        };

        let prefix = format!("{}{}", resource, KEY_SEPARATOR);
        let mut remaining = Vec::with_capacity(keys.len());
        for key in keys {
            if key != current && key.starts_with(&prefix) {
                if let Ok(Some(entry)) = self.load(&key) {
                    if entry.resource == resource && entry.mode == mode && self.remove(&key) {
                        continue;
                    }
                }
            }
            remaining.push(key);
        }

        if let Some(max) = self.config.max_entries {
            self.evict_oldest(remaining, current, max);
        }
    }

    fn evict_oldest(&self, keys: Vec<String>, current: &str, max: usize) {
        if keys.len() <= max {
            return;
        }

        // Undecodable entries sort first so they are evicted before real data
        let mut candidates: Vec<(Option<DateTime<Utc>>, String)> = keys
            .into_iter()
            .filter(|key| key != current)
            .map(|key| {
                let stored_at = self.load(&key).ok().flatten().map(|e| e.stored_at);
                (stored_at, key)
            })
            .collect();
        candidates.sort();

        let mut count = candidates.len() + 1;
        for (_, key) in candidates {
            if count <= max {
                break;
            }
            if self.remove(&key) {
                count -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::bucket::ManualClock;
    use crate::cache::storage::{FileStorage, MemoryStorage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestData {
        name: String,
        value: i32,
    }

    /// Storage that fails every write while `fail_writes` is set
    #[derive(Default)]
    struct FlakyStorage {
        inner: MemoryStorage,
        fail_writes: Arc<AtomicBool>,
        fail_reads: Arc<AtomicBool>,
    }

    impl Storage for FlakyStorage {
        fn read_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("read refused".to_string()));
            }
            self.inner.read_raw(key)
        }

        fn write_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("quota exceeded".to_string()));
            }
            self.inner.write_raw(key, value)
        }

        fn remove_raw(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_raw(key)
        }

        fn keys(&self) -> Result<Vec<String>, StorageError> {
            self.inner.keys()
        }
    }

    fn create_test_cache(now: &str) -> (TimeBucketedCache, ManualClock) {
        let clock = ManualClock::at(now);
        let cache = TimeBucketedCache::new(MemoryStorage::new()).with_clock(clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_get_after_set_returns_value() {
        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        let data = TestData {
            name: "stats".to_string(),
            value: 42,
        };

        cache.set("transaction-count", BucketMode::Date, &data);

        assert_eq!(cache.get("transaction-count", BucketMode::Date), Some(data));
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        let result: Option<TestData> = cache.get("never-written", BucketMode::Date);
        assert!(result.is_none());
    }

    #[test]
    fn test_key_combines_resource_and_bucket() {
        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        assert_eq!(
            cache.key_for("transaction-count", BucketMode::Date),
            "transaction-count-2024-01-01"
        );
        assert_eq!(
            cache.key_for("lasted-having-1", BucketMode::None),
            "lasted-having-1-static"
        );
    }

    #[test]
    fn test_date_bucket_rollover() {
        let (cache, clock) = create_test_cache("2024-01-01T23:59:59Z");
        cache.set("stats", BucketMode::Date, &7);

        clock.set("2024-01-01T23:59:59.500Z");
        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), Some(7));

        clock.set("2024-01-02T00:00:00Z");
        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
    }

    #[test]
    fn test_overwrite_second_value_wins() {
        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("stats", BucketMode::Date, "first");
        cache.set("stats", BucketMode::Date, "second");

        assert_eq!(
            cache.get::<String>("stats", BucketMode::Date).as_deref(),
            Some("second")
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resources_are_isolated() {
        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("A", BucketMode::Date, &1);

        assert_eq!(cache.get::<i32>("B", BucketMode::Date), None);
        assert!(!cache.has("B", BucketMode::Date));
    }

    #[test]
    fn test_prefix_resource_is_not_pruned_as_stale_bucket() {
        let (cache, clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("chart-tx", BucketMode::Date, &1);

        clock.advance(chrono::Duration::days(1));
        // "chart" shares a prefix with "chart-tx" but is a different resource
        cache.set("chart", BucketMode::Date, &2);
        clock.advance(chrono::Duration::days(-1));

        assert_eq!(cache.get::<i32>("chart-tx", BucketMode::Date), Some(1));
    }

    #[test]
    fn test_none_mode_never_expires() {
        let (cache, clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("flag-halving-1", BucketMode::None, &true);
        assert!(cache.has("flag-halving-1", BucketMode::None));

        clock.advance(chrono::Duration::days(3650));
        assert!(cache.has("flag-halving-1", BucketMode::None));
        assert_eq!(cache.get::<bool>("flag-halving-1", BucketMode::None), Some(true));
    }

    #[test]
    fn test_write_failure_is_swallowed_and_reads_miss() {
        let storage = FlakyStorage::default();
        let fail_writes = storage.fail_writes.clone();
        let cache = TimeBucketedCache::new(storage).with_clock(ManualClock::at("2024-01-01T10:00:00Z"));

        fail_writes.store(true, Ordering::SeqCst);
        cache.set("stats", BucketMode::Date, &1);

        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
    }

    #[test]
    fn test_failed_overwrite_does_not_leave_stale_value() {
        let storage = FlakyStorage::default();
        let fail_writes = storage.fail_writes.clone();
        let cache = TimeBucketedCache::new(storage).with_clock(ManualClock::at("2024-01-01T10:00:00Z"));

        cache.set("stats", BucketMode::Date, &1);
        fail_writes.store(true, Ordering::SeqCst);
        cache.set("stats", BucketMode::Date, &2);

        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
    }

    #[test]
    fn test_read_failure_is_a_miss() {
        let storage = FlakyStorage::default();
        let fail_reads = storage.fail_reads.clone();
        let cache = TimeBucketedCache::new(storage).with_clock(ManualClock::at("2024-01-01T10:00:00Z"));

        cache.set("stats", BucketMode::Date, &1);
        fail_reads.store(true, Ordering::SeqCst);

        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
        assert!(!cache.has("stats", BucketMode::Date));
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("stats", BucketMode::Date, "not a number");
        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
    }

    #[test]
    fn test_unserializable_overwrite_drops_previous_value() {
        use std::collections::HashMap;

        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("stats", BucketMode::Date, &1);

        // JSON objects need string keys, so this map cannot be encoded
        let mut value = HashMap::new();
        value.insert((1, 2), 3);
        cache.set("stats", BucketMode::Date, &value);

        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
        assert!(!cache.has("stats", BucketMode::Date));
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::with_dir(temp_dir.path().to_path_buf());
        storage.write_raw("stats-2024-01-01", "{not json").unwrap();
        let cache = TimeBucketedCache::new(storage).with_clock(ManualClock::at("2024-01-01T10:00:00Z"));

        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
    }

    #[test]
    fn test_entry_records_stored_at() {
        let (cache, _clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("stats", BucketMode::Date, &1);

        let entry = cache.entry("stats", BucketMode::Date).expect("entry should exist");
        assert_eq!(entry.key, "stats-2024-01-01");
        assert_eq!(entry.resource, "stats");
        assert_eq!(entry.stored_at.to_rfc3339(), "2024-01-01T10:00:00+00:00");
    }

    #[test]
    fn test_writing_new_bucket_prunes_old_bucket() {
        let (cache, clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("stats", BucketMode::Date, &1);
        clock.set("2024-01-02T10:00:00Z");
        cache.set("stats", BucketMode::Date, &2);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), Some(2));
    }

    #[test]
    fn test_prune_stale_removes_rolled_over_entries() {
        let (cache, clock) = create_test_cache("2024-01-01T10:00:00Z");
        cache.set("a", BucketMode::Date, &1);
        cache.set("b", BucketMode::Hour, &2);
        cache.set("flag", BucketMode::None, &true);

        clock.set("2024-01-01T11:30:00Z");
        assert_eq!(cache.prune_stale(), 1);
        assert_eq!(cache.len(), 2);

        clock.set("2024-01-02T00:00:00Z");
        assert_eq!(cache.prune_stale(), 1);
        assert!(cache.has("flag", BucketMode::None));
    }

    #[test]
    fn test_capacity_evicts_oldest_first() {
        let clock = ManualClock::at("2024-01-01T10:00:00Z");
        let cache = TimeBucketedCache::new(MemoryStorage::new())
            .with_clock(clock.clone())
            .with_max_entries(2);

        cache.set("first", BucketMode::None, &1);
        clock.advance(chrono::Duration::seconds(1));
        cache.set("second", BucketMode::None, &2);
        clock.advance(chrono::Duration::seconds(1));
        cache.set("third", BucketMode::None, &3);

        assert_eq!(cache.len(), 2);
        assert!(!cache.has("first", BucketMode::None));
        assert!(cache.has("second", BucketMode::None));
        assert!(cache.has("third", BucketMode::None));
    }

    #[test]
    fn test_capacity_of_one_keeps_latest_write() {
        let cache = TimeBucketedCache::new(MemoryStorage::new())
            .with_clock(ManualClock::at("2024-01-01T10:00:00Z"))
            .with_max_entries(1);

        cache.set("a", BucketMode::None, &1);
        cache.set("b", BucketMode::None, &2);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<i32>("b", BucketMode::None), Some(2));
    }

    #[test]
    fn test_capacity_evicts_undecodable_entries_first() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::with_dir(temp_dir.path().to_path_buf());
        storage.write_raw("junk", "{not json").unwrap();

        let clock = ManualClock::at("2024-01-01T10:00:00Z");
        let cache = TimeBucketedCache::new(storage)
            .with_clock(clock.clone())
            .with_max_entries(2);

        cache.set("a", BucketMode::None, &1);
        clock.advance(chrono::Duration::seconds(1));
        cache.set("b", BucketMode::None, &2);

        assert!(!temp_dir.path().join("junk.json").exists());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i32>("a", BucketMode::None), Some(1));
        assert_eq!(cache.get::<i32>("b", BucketMode::None), Some(2));
    }

    #[test]
    fn test_timezone_changes_bucket_boundary() {
        let clock = ManualClock::at("2024-01-01T15:00:00Z");
        let cache = TimeBucketedCache::new(MemoryStorage::new())
            .with_clock(clock.clone())
            .with_timezone(FixedOffset::east_opt(8 * 3600).unwrap());

        cache.set("stats", BucketMode::Date, &1);
        // 16:00 UTC is midnight in UTC+8
        clock.set("2024-01-01T16:00:00Z");

        assert_eq!(cache.get::<i32>("stats", BucketMode::Date), None);
    }

    #[test]
    fn test_file_backed_cache_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let data = TestData {
            name: "persisted".to_string(),
            value: 5,
        };

        let first = TimeBucketedCache::new(FileStorage::with_dir(temp_dir.path().to_path_buf()))
            .with_clock(ManualClock::at("2024-01-01T10:00:00Z"));
        first.set("stats", BucketMode::Date, &data);

        let second = TimeBucketedCache::new(FileStorage::with_dir(temp_dir.path().to_path_buf()))
            .with_clock(ManualClock::at("2024-01-01T20:00:00Z"));
        assert_eq!(second.get("stats", BucketMode::Date), Some(data));
    }
}
