use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::KeyValueStore;
use crate::error::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStamp {
    pub stored_at: u64,
    pub last_used: u64,
}

type BucketStamps = BTreeMap<String, EntryStamp>;

/// Per-bucket age and recency of cached entries, mirrored into the worker's
/// key-value store so limits survive worker restarts.
pub struct ExpirationLedger<K> {
    store: Rc<K>,
    buckets: RefCell<HashMap<String, BucketStamps>>,
}

impl<K: KeyValueStore> ExpirationLedger<K> {
    pub fn new(store: Rc<K>) -> Self {
        Self {
            store,
            buckets: RefCell::new(HashMap::new()),
        }
    }

    fn storage_key(bucket: &str) -> String {
        format!("expiration.{bucket}")
    }

    pub fn stamp(&self, bucket: &str, url: &str) -> Option<EntryStamp> {
        self.buckets.borrow().get(bucket).and_then(|stamps| stamps.get(url).copied())
    }

    /// Entries without a stamp were written before the ledger existed and
    /// count as fresh until their next write.
    pub async fn is_fresh(&self, bucket: &str, url: &str, max_age_ms: u64, now_ms: u64) -> Result<bool, CacheError> {
        self.ensure_loaded(bucket).await?;
        Ok(match self.stamp(bucket, url) {
            Some(stamp) => now_ms.saturating_sub(stamp.stored_at) <= max_age_ms,
            None => true,
        })
    }

    pub async fn touch(&self, bucket: &str, url: &str, now_ms: u64) -> Result<(), CacheError> {
        self.ensure_loaded(bucket).await?;
        {
            let mut buckets = self.buckets.borrow_mut();
            let stamps = buckets.entry(bucket.to_string()).or_default();
            stamps
                .entry(url.to_string())
                .and_modify(|stamp| stamp.last_used = now_ms)
                .or_insert(EntryStamp {
                    stored_at: now_ms,
                    last_used: now_ms,
                });
        }
        self.persist(bucket).await
    }

    /// Stamps a fresh write and returns the URLs that must leave the bucket:
    /// everything past `max_age_ms`, then the least recently used entries
    /// beyond `max_entries`. The entry just written is never evicted.
    pub async fn record_write(
        &self,
        bucket: &str,
        url: &str,
        now_ms: u64,
        max_entries: usize,
        max_age_ms: u64,
    ) -> Result<Vec<String>, CacheError> {
        self.ensure_loaded(bucket).await?;
        let evicted = {
            let mut buckets = self.buckets.borrow_mut();
            let stamps = buckets.entry(bucket.to_string()).or_default();
            stamps.insert(
                url.to_string(),
                EntryStamp {
                    stored_at: now_ms,
                    last_used: now_ms,
                },
            );

            let mut evicted: Vec<String> = stamps
                .iter()
                .filter(|(key, stamp)| {
                    key.as_str() != url && now_ms.saturating_sub(stamp.stored_at) > max_age_ms
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &evicted {
                stamps.remove(key);
            }

            if max_entries > 0 && stamps.len() > max_entries {
                let mut by_recency: Vec<(String, EntryStamp)> = stamps
                    .iter()
                    .filter(|(key, _)| key.as_str() != url)
                    .map(|(key, stamp)| (key.clone(), *stamp))
                    .collect();
                by_recency.sort_by_key(|(_, stamp)| (stamp.last_used, stamp.stored_at));

                let excess = stamps.len() - max_entries;
                for (key, _) in by_recency.into_iter().take(excess) {
                    stamps.remove(&key);
                    evicted.push(key);
                }
            }
            evicted
        };

        if !evicted.is_empty() {
            debug!(bucket, count = evicted.len(), "evicting cache entries");
        }
        self.persist(bucket).await?;
        Ok(evicted)
    }

    pub async fn drop_bucket(&self, bucket: &str) -> Result<(), CacheError> {
        self.buckets.borrow_mut().remove(bucket);
        self.store.remove(&Self::storage_key(bucket)).await
    }

    async fn ensure_loaded(&self, bucket: &str) -> Result<(), CacheError> {
        if self.buckets.borrow().contains_key(bucket) {
            return Ok(());
        }

        let raw = self.store.get(&Self::storage_key(bucket)).await?;
        let stamps = match raw {
            Some(raw) => serde_json::from_str::<BucketStamps>(&raw).unwrap_or_else(|error| {
                warn!(%error, bucket, "discarding unreadable expiration ledger");
                BucketStamps::new()
            }),
            None => BucketStamps::new(),
        };
        self.buckets.borrow_mut().entry(bucket.to_string()).or_insert(stamps);
        Ok(())
    }

    async fn persist(&self, bucket: &str) -> Result<(), CacheError> {
        let json = {
            let buckets = self.buckets.borrow();
            let empty = BucketStamps::new();
            let stamps = buckets.get(bucket).unwrap_or(&empty);
            serde_json::to_string(stamps).map_err(|e| CacheError::Settings(e.to_string()))?
        };
        self.store.put(&Self::storage_key(bucket), &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        map: RefCell<BTreeMap<String, String>>,
    }

    impl KeyValueStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            Ok(self.map.borrow().get(key).cloned())
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
            self.map.borrow_mut().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<(), CacheError> {
            self.map.borrow_mut().remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn evicts_least_recently_used_over_cap() {
        let ledger = ExpirationLedger::new(Rc::new(MemoryStore::default()));
        ledger.record_write("b", "/a", 1, 2, 1_000).await.expect("write a");
        ledger.record_write("b", "/b", 2, 2, 1_000).await.expect("write b");
        ledger.touch("b", "/a", 3).await.expect("touch a");

        let evicted = ledger.record_write("b", "/c", 4, 2, 1_000).await.expect("write c");
        assert_eq!(evicted, vec!["/b".to_string()]);
        assert!(ledger.stamp("b", "/a").is_some());
        assert!(ledger.stamp("b", "/b").is_none());
    }

    #[tokio::test]
    async fn expired_entries_leave_on_next_write() {
        let ledger = ExpirationLedger::new(Rc::new(MemoryStore::default()));
        ledger.record_write("b", "/old", 0, 10, 100).await.expect("write old");
        assert!(ledger.is_fresh("b", "/old", 100, 100).await.expect("fresh"));
        assert!(!ledger.is_fresh("b", "/old", 100, 101).await.expect("stale"));

        let evicted = ledger.record_write("b", "/new", 500, 10, 100).await.expect("write new");
        assert_eq!(evicted, vec!["/old".to_string()]);
    }

    #[tokio::test]
    async fn ledger_survives_restart() {
        let store = Rc::new(MemoryStore::default());
        {
            let ledger = ExpirationLedger::new(store.clone());
            ledger.record_write("b", "/kept", 7, 10, 100).await.expect("write");
        }
        let reloaded = ExpirationLedger::new(store);
        assert!(reloaded.is_fresh("b", "/kept", 100, 50).await.expect("fresh"));
        assert_eq!(
            reloaded.stamp("b", "/kept"),
            Some(EntryStamp {
                stored_at: 7,
                last_used: 7
            })
        );
    }
}
