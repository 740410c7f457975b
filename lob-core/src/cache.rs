//! Short-lived key-value hand-off between ingestion steps
//!
//! Extraction and processing of a batch happen in two steps; the raw
//! extraction waits here, keyed by batch id, until the second step picks it
//! up or the entry expires.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[async_trait]
pub trait HandoffCache<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    async fn put(&self, key: &str, value: V);

    /// Remove and return a live entry
    async fn take(&self, key: &str) -> Option<V>;

    async fn contains(&self, key: &str) -> bool;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> usize;
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-memory cache with a fixed time-to-live per entry
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<String, Entry<V>>>>,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl<V> HandoffCache<V> for TtlCache<V>
where
    V: Send + Sync + 'static,
{
    async fn put(&self, key: &str, value: V) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    async fn take(&self, key: &str) -> Option<V> {
        let entry = self.entries.write().await.remove(key)?;
        (entry.expires_at > Instant::now()).then_some(entry.value)
    }

    async fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|e| e.expires_at > Instant::now())
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}
