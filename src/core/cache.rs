#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Short-lived key/value cache. Expired entries read as absent and are
/// dropped lazily on access or by [`TtlCache::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct TtlCache {
    inner: Arc<DashMap<String, CacheEntry>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let hit = self.inner.get(key).map(|e| (e.expires_at > now, e.value.clone()));
        match hit {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                self.inner.remove_if(key, |_, e| e.expires_at <= now);
                None
            }
            None => None,
        }
    }

    pub fn set_with_expiry(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        self.inner.insert(
            key.into(),
            CacheEntry {
                value: value.into(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_until_expiry() {
        let cache = TtlCache::new();
        cache.set_with_expiry("listing:0x01", "1", Duration::from_secs(60));
        assert_eq!(cache.get("listing:0x01").as_deref(), Some("1"));
        assert!(cache.contains("listing:0x01"));
        assert!(!cache.contains("listing:0x02"));
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let cache = TtlCache::new();
        cache.set_with_expiry("k", "v", Duration::ZERO);
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache = TtlCache::new();
        cache.set_with_expiry("old", "v", Duration::ZERO);
        cache.set_with_expiry("fresh", "v", Duration::from_secs(60));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("fresh"));
    }
}
