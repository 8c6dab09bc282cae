use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Key-value store with per-key TTL. Backs the verification rate limiter and
/// list-response caching. Values are strings; callers serialize as needed.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: String, ttl: Duration);

    async fn delete(&self, key: &str);

    /// Remaining time-to-live for a live key, `None` if absent or expired.
    async fn ttl(&self, key: &str) -> Option<Duration>;
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, deadline)) if *deadline > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
    }

    async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, deadline)) => {
                let now = Instant::now();
                if *deadline > now {
                    Some(*deadline - now)
                } else {
                    entries.remove(key);
                    None
                }
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn expired_keys_are_gone() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_millis(20))
            .await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.ttl("k").await, None);
    }

    #[tokio::test]
    async fn ttl_reports_remaining_time() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(3600))
            .await;
        let remaining = cache.ttl("k").await.expect("key should be live");
        assert!(remaining <= Duration::from_secs(3600));
        assert!(remaining > Duration::from_secs(3590));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await;
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }
}
