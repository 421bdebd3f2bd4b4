//! In-memory registry of prepared Deep Q&A indexes.
//!
//! Entries are published whole: a reader either gets the complete previous index or the
//! complete new one. Retention is bounded by an LRU cap and an optional TTL.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::vector::FlatL2Index;

/// A searchable, immutable index over one dataset's chunk summaries
#[derive(Debug)]
pub struct QaIndex {
    pub dataset_id: i64,
    /// User the index was prepared for
    pub owner: String,
    /// Chunk summaries in chunk order; position `i` matches vector `i`
    pub summaries: Vec<String>,
    pub index: FlatL2Index,
    pub embedding_model: String,
    pub prepared_at: DateTime<Utc>,
}

impl QaIndex {
    pub fn num_chunks(&self) -> usize {
        self.summaries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionConfig {
    /// Maximum number of prepared datasets kept; 0 means unbounded
    pub max_entries: usize,
    pub ttl: Option<Duration>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl: None,
        }
    }
}

struct Entry {
    index: Arc<QaIndex>,
    expires_at: Option<DateTime<Utc>>,
    last_used: AtomicU64,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map_or(false, |exp| Utc::now() > exp)
    }
}

/// Shared store of prepared indexes, keyed by dataset id
pub struct IndexStore {
    entries: RwLock<HashMap<i64, Entry>>,
    retention: RetentionConfig,
    clock: AtomicU64,
}

impl IndexStore {
    pub fn new(retention: RetentionConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
            clock: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Replace the index for `index.dataset_id`, returning the one it replaced
    pub async fn publish(&self, index: QaIndex) -> Option<Arc<QaIndex>> {
        let dataset_id = index.dataset_id;
        let now = Utc::now();
        let expires_at = self
            .retention
            .ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl);
        let entry = Entry {
            index: Arc::new(index),
            expires_at,
            last_used: AtomicU64::new(self.tick()),
        };

        let mut entries = self.entries.write().await;
        let previous = entries.insert(dataset_id, entry).map(|e| e.index);

        let max_entries = self.retention.max_entries;
        while max_entries > 0 && entries.len() > max_entries {
            let oldest = entries
                .iter()
                .filter(|(id, _)| **id != dataset_id)
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    entries.remove(&id);
                    debug!("Evicted prepared index for dataset {}", id);
                }
                None => break,
            }
        }

        previous
    }

    /// Current index for `dataset_id`, unless absent or expired
    pub async fn get(&self, dataset_id: i64) -> Option<Arc<QaIndex>> {
        let entries = self.entries.read().await;
        let entry = entries.get(&dataset_id)?;
        if entry.is_expired() {
            return None;
        }
        entry.last_used.store(self.tick(), Ordering::Relaxed);
        Some(entry.index.clone())
    }

    pub async fn remove(&self, dataset_id: i64) -> Option<Arc<QaIndex>> {
        self.entries
            .write()
            .await
            .remove(&dataset_id)
            .map(|e| e.index)
    }

    /// Drop expired entries, returning how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Periodically sweep expired entries until the store is dropped
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        if self.retention.ttl.is_none() {
            return;
        }

        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let cleaned = store.cleanup_expired().await;
                if cleaned > 0 {
                    tracing::info!("Cleaned up {} expired Deep Q&A indexes", cleaned);
                }
            }
        });
    }
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new(RetentionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa_index(dataset_id: i64, summary: &str) -> QaIndex {
        QaIndex {
            dataset_id,
            owner: "alice@example.com".to_string(),
            summaries: vec![summary.to_string()],
            index: FlatL2Index::build(&[vec![1.0, 0.0]]).unwrap(),
            embedding_model: "test".to_string(),
            prepared_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_get() {
        let store = IndexStore::default();
        assert!(store.get(1).await.is_none());

        assert!(store.publish(qa_index(1, "first")).await.is_none());
        let index = store.get(1).await.unwrap();
        assert_eq!(index.summaries, vec!["first"]);
        assert_eq!(index.num_chunks(), 1);
    }

    #[tokio::test]
    async fn test_publish_replaces_whole_index() {
        let store = IndexStore::default();
        store.publish(qa_index(1, "first")).await;
        let held = store.get(1).await.unwrap();

        let previous = store.publish(qa_index(1, "second")).await.unwrap();
        assert_eq!(previous.summaries, vec!["first"]);

        // readers holding the old handle keep a complete index
        assert_eq!(held.summaries, vec!["first"]);
        assert_eq!(store.get(1).await.unwrap().summaries, vec!["second"]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = IndexStore::default();
        store.publish(qa_index(7, "x")).await;
        assert!(store.remove(7).await.is_some());
        assert!(store.get(7).await.is_none());
        assert!(store.remove(7).await.is_none());
    }

    #[tokio::test]
    async fn test_lru_cap_evicts_least_recently_used() {
        let store = IndexStore::new(RetentionConfig {
            max_entries: 2,
            ttl: None,
        });
        store.publish(qa_index(1, "one")).await;
        store.publish(qa_index(2, "two")).await;

        // touch 1 so 2 becomes the eviction candidate
        store.get(1).await;
        store.publish(qa_index(3, "three")).await;

        assert_eq!(store.len().await, 2);
        assert!(store.get(1).await.is_some());
        assert!(store.get(2).await.is_none());
        assert!(store.get(3).await.is_some());
    }

    #[tokio::test]
    async fn test_zero_cap_is_unbounded() {
        let store = IndexStore::new(RetentionConfig {
            max_entries: 0,
            ttl: None,
        });
        for id in 0..10 {
            store.publish(qa_index(id, "x")).await;
        }
        assert_eq!(store.len().await, 10);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = IndexStore::new(RetentionConfig {
            max_entries: 0,
            ttl: Some(Duration::from_millis(10)),
        });
        store.publish(qa_index(1, "x")).await;
        assert!(store.get(1).await.is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get(1).await.is_none());
        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 0);
    }
}
