use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

struct Entry<V> {
    value: V,
    refreshed_at: Instant,
}

/// Bounded LRU with a soft time-to-live.
///
/// Reads refresh both recency and age; entries past the TTL are dropped on
/// the read that discovers them rather than by a background sweeper.
pub(crate) struct TtlCache<K: Hash + Eq, V> {
    inner: LruCache<K, Entry<V>>,
    ttl: Duration,
}

impl<K: Hash + Eq + Clone, V: Clone> TtlCache<K, V> {
    pub(crate) fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            inner: LruCache::new(capacity),
            ttl,
        }
    }

    pub(crate) fn get(&mut self, key: &K) -> Option<V> {
        let expired = match self.inner.get_mut(key) {
            Some(entry) if entry.refreshed_at.elapsed() <= self.ttl => {
                entry.refreshed_at = Instant::now();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.inner.pop(key);
        }
        None
    }

    pub(crate) fn put(&mut self, key: K, value: V) {
        self.inner.put(
            key,
            Entry {
                value,
                refreshed_at: Instant::now(),
            },
        );
    }

    /// Drop every entry past the TTL. Returns how many were removed.
    pub(crate) fn purge_expired(&mut self) -> usize {
        let expired: Vec<K> = self
            .inner
            .iter()
            .filter(|(_, entry)| entry.refreshed_at.elapsed() > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.inner.pop(key);
        }
        expired.len()
    }

    pub(crate) fn clear(&mut self) {
        self.inner.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(cap: usize, ttl: Duration) -> TtlCache<String, u32> {
        TtlCache::new(NonZeroUsize::new(cap).unwrap(), ttl)
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut c = cache(2, Duration::from_secs(60));
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        assert_eq!(c.get(&"a".into()), Some(1));
        c.put("c".into(), 3);

        assert_eq!(c.get(&"b".into()), None);
        assert_eq!(c.get(&"a".into()), Some(1));
        assert_eq!(c.get(&"c".into()), Some(3));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let mut c = cache(4, Duration::ZERO);
        c.put("a".into(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(c.get(&"a".into()), None);
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn reads_extend_entry_age() {
        let mut c = cache(4, Duration::from_millis(80));
        c.put("a".into(), 1);
        for _ in 0..4 {
            std::thread::sleep(Duration::from_millis(30));
            assert_eq!(c.get(&"a".into()), Some(1));
        }
    }

    #[test]
    fn purge_expired_reports_removals() {
        let mut c = cache(4, Duration::ZERO);
        c.put("a".into(), 1);
        c.put("b".into(), 2);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(c.purge_expired(), 2);
        assert_eq!(c.len(), 0);
    }
}
