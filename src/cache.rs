//! Two-tier stream cache with analytics.
//!
//! The memory tier uses `moka` for its memory+TTL+LRU combination. A read
//! checks the memory tier first and only falls back to the persistent tier
//! on a miss, promoting a persistent hit back up to memory. The persistent
//! tier is a host-provided [`StreamStore`] this crate never implements
//! itself.

use std::{sync::Arc, time::{Duration, Instant, SystemTime}};

use moka::{future::Cache, Expiry};

use crate::{
    error::Result,
    kv::StreamStore,
    types::{CacheAnalytics, CacheAnalyticsSnapshot, StreamRecord},
};

/// Persistent-tier LRU cap.
const MAX_ENTRIES: u64 = 100;

/// Computes each memory-tier entry's expiry from the record's own
/// `expires_in_seconds`/`fetched_at`, so moka evicts exactly when 's
/// validity window closes rather than on a fixed TTL.
struct RecordExpiry;

impl Expiry<String, StreamRecord> for RecordExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StreamRecord,
        _created_at: Instant,
    ) -> Option<Duration> {
        let guarded = value
            .expires_in_seconds
            .saturating_sub(StreamRecord::EXPIRY_GUARD_SECONDS);
        let age = SystemTime::now()
            .duration_since(value.fetched_at)
            .unwrap_or_default();
        Some(Duration::from_secs(guarded).saturating_sub(age))
    }
}

/// Memory + persistent resolved-stream cache.
pub struct StreamCache {
    memory: Cache<String, StreamRecord>,
    store: Arc<dyn StreamStore>,
    analytics: Arc<CacheAnalytics>,
}

impl StreamCache {
    /// Builds a cache backed by the given persistent store.
    #[must_use]
    pub fn new(store: Arc<dyn StreamStore>) -> Self {
        let memory = Cache::builder()
            .max_capacity(MAX_ENTRIES)
            .expire_after(RecordExpiry)
            .build();
        Self {
            memory,
            store,
            analytics: Arc::new(CacheAnalytics::default()),
        }
    }

    /// Shared analytics handle; counters increment as `get`/`put` are called.
    #[must_use]
    pub fn analytics(&self) -> Arc<CacheAnalytics> {
        Arc::clone(&self.analytics)
    }

    /// Snapshot of the current analytics counters.
    #[must_use]
    pub fn analytics_snapshot(&self) -> CacheAnalyticsSnapshot {
        self.analytics.snapshot()
    }

    /// Reads a record for `video_id`. Memory first, then persistent with
    /// promotion on hit. Expired records are evicted from both
    /// tiers before returning a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent store read or delete fails.
    pub async fn get(&self, video_id: &str) -> Result<Option<StreamRecord>> {
        let now = SystemTime::now();

        if let Some(record) = self.memory.get(video_id).await {
            if record.is_valid_at(now) {
                self.analytics.record_hit();
                return Ok(Some(record));
            }
            self.memory.invalidate(video_id).await;
        }

        let Some((raw, _written_at)) = self.store.get(video_id).await? else {
            self.analytics.record_miss();
            return Ok(None);
        };

        let record: StreamRecord = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(_) => {
                self.store.delete(video_id).await?;
                self.analytics.record_miss();
                return Ok(None);
            }
        };

        if !record.is_valid_at(now) {
            self.store.delete(video_id).await?;
            self.analytics.record_miss();
            return Ok(None);
        }

        self.memory.insert(video_id.to_owned(), record.clone()).await;
        self.analytics.record_hit();
        Ok(Some(record))
    }

    /// Writes a record to both tiers, persistent first, then
    /// trims the persistent tier down to [`MAX_ENTRIES`] oldest-first.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent store write or trim fails.
    pub async fn put(&self, record: StreamRecord) -> Result<()> {
        let encoded = serde_json::to_vec(&record)?;
        let written_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.store.set(&record.video_id, encoded, written_at).await?;
        self.trim().await?;
        self.memory.insert(record.video_id.clone(), record).await;
        Ok(())
    }

    /// Checks whether a valid record exists for `video_id`, in either tier,
    /// without touching the analytics counters or promoting a persistent
    /// hit to memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent store read fails.
    pub async fn contains_valid(&self, video_id: &str) -> Result<bool> {
        let now = SystemTime::now();
        if let Some(record) = self.memory.get(video_id).await {
            if record.is_valid_at(now) {
                return Ok(true);
            }
        }
        let Some((raw, _written_at)) = self.store.get(video_id).await? else {
            return Ok(false);
        };
        Ok(serde_json::from_slice::<StreamRecord>(&raw).is_ok_and(|record| record.is_valid_at(now)))
    }

    /// Removes one entry from both tiers`).
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent store delete fails.
    pub async fn clear_one(&self, video_id: &str) -> Result<()> {
        self.memory.invalidate(video_id).await;
        self.store.delete(video_id).await
    }

    /// Removes every entry from both tiers`).
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent store clear fails.
    pub async fn clear_all(&self) -> Result<()> {
        self.memory.invalidate_all();
        self.store.clear().await
    }

    async fn trim(&self) -> Result<()> {
        let keys = self.store.keys_oldest_first().await?;
        if keys.len() as u64 <= MAX_ENTRIES {
            return Ok(());
        }
        let overflow = keys.len() - MAX_ENTRIES as usize;
        for key in &keys[..overflow] {
            self.store.delete(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioVariant;
    use async_trait::async_trait;
    use std::{collections::HashMap, sync::Mutex as StdMutex};
    use url::Url;

    #[derive(Default)]
    struct MemoryStore {
        data: StdMutex<HashMap<String, (Vec<u8>, u64)>>,
    }

    #[async_trait]
    impl StreamStore for MemoryStore {
        async fn get(&self, video_id: &str) -> Result<Option<(Vec<u8>, u64)>> {
            Ok(self.data.lock().unwrap().get(video_id).cloned())
        }
        async fn set(&self, video_id: &str, value: Vec<u8>, written_at: u64) -> Result<()> {
            self.data
                .lock()
                .unwrap()
                .insert(video_id.to_owned(), (value, written_at));
            Ok(())
        }
        async fn delete(&self, video_id: &str) -> Result<()> {
            self.data.lock().unwrap().remove(video_id);
            Ok(())
        }
        async fn clear(&self) -> Result<()> {
            self.data.lock().unwrap().clear();
            Ok(())
        }
        async fn keys_oldest_first(&self) -> Result<Vec<String>> {
            let mut entries: Vec<_> = self
                .data
                .lock()
                .unwrap()
                .iter()
                .map(|(k, (_, written_at))| (k.clone(), *written_at))
                .collect();
            entries.sort_by_key(|(_, written_at)| *written_at);
            Ok(entries.into_iter().map(|(k, _)| k).collect())
        }
    }

    fn fixture_record(video_id: &str, expires_in_seconds: u64) -> StreamRecord {
        StreamRecord {
            video_id: video_id.to_owned(),
            url: Url::parse("https://example.com/stream").unwrap(),
            expires_in_seconds,
            fetched_at: SystemTime::now(),
            variant: AudioVariant {
                mime_type: "audio/webm".into(),
                bitrate: 160_000,
                sample_rate: None,
                channel_count: None,
                codec: None,
                content_length: None,
                url: Url::parse("https://example.com/stream").unwrap(),
                signature: None,
                signature_param: None,
            },
            loudness_db: None,
            video_details: None,
            telemetry_urls: Vec::new(),
        }
    }

    #[tokio::test]
    async fn miss_then_hit_after_put() {
        let cache = StreamCache::new(Arc::new(MemoryStore::default()));
        assert!(cache.get("v1").await.unwrap().is_none());
        cache.put(fixture_record("v1", 3600)).await.unwrap();
        assert!(cache.get("v1").await.unwrap().is_some());
        let snapshot = cache.analytics_snapshot();
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.hits, 1);
    }

    #[tokio::test]
    async fn clear_one_forces_a_miss_on_next_read() {
        let cache = StreamCache::new(Arc::new(MemoryStore::default()));
        cache.put(fixture_record("v1", 3600)).await.unwrap();
        cache.clear_one("v1").await.unwrap();
        assert!(cache.get("v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_record_reads_as_a_miss_and_is_evicted() {
        let store = Arc::new(MemoryStore::default());
        let cache = StreamCache::new(Arc::clone(&store) as Arc<dyn StreamStore>);
        // expires_in_seconds shorter than the guard window: already expired.
        cache.put(fixture_record("v1", 10)).await.unwrap();
        assert!(cache.get("v1").await.unwrap().is_none());
        assert!(store.get("v1").await.unwrap().is_none());
    }
}
