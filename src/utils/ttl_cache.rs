use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Slot<V> {
    value: Arc<V>,
    stored_at: Instant,
}

/// Capacity- and TTL-bounded concurrent cache. One instance per entity kind
/// backs the derivative repository; entries expire a few hours after the
/// fill and the oldest entry is evicted when the capacity is reached.
pub struct TtlCache<V> {
    entries: DashMap<String, Slot<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Send + Sync + 'static> TtlCache<V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let expired = match self.entries.get(key) {
            Some(slot) if slot.stored_at.elapsed() <= self.ttl => {
                return Some(slot.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: impl Into<String>, value: Arc<V>) {
        if self.entries.len() >= self.capacity {
            self.evict_one();
        }
        self.entries.insert(
            key.into(),
            Slot {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop expired entries, then the oldest one if still at capacity.
    fn evict_one(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, slot| slot.stored_at.elapsed() <= ttl);
        if self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().stored_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_insert() {
        let cache = TtlCache::new(4, Duration::from_secs(60));
        cache.insert("k", Arc::new(7u32));
        assert_eq!(cache.get("k").as_deref(), Some(&7));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = TtlCache::new(4, Duration::ZERO);
        cache.insert("k", Arc::new(1u32));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a", Arc::new(1u32));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("b", Arc::new(2u32));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert("c", Arc::new(3u32));

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some(&2));
        assert_eq!(cache.get("c").as_deref(), Some(&3));
    }
}
