//! A bounded least-recently-used map.

use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    hash::Hash,
};

/// Counters of one cache, copied out on demand.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let accesses = self.hits + self.misses;
        if accesses == 0 {
            0.0
        } else {
            self.hits as f64 / accesses as f64
        }
    }
}

/// Recency is a monotonically increasing tick per entry; the oldest tick is evicted first.
#[derive(Debug)]
pub struct BoundedLru<K, V> {
    capacity: usize,
    tick: u64,
    entries: HashMap<K, (V, u64)>,
    recency: BTreeMap<u64, K>,
    stats: CacheStats,
}

impl<K, V> BoundedLru<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        BoundedLru {
            capacity,
            tick: 0,
            entries: HashMap::with_capacity(capacity),
            recency: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up `key`, marking it most recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let tick = self.next_tick();
        let Some((value, last)) = self.entries.get_mut(key) else {
            self.stats.misses += 1;
            return None;
        };
        self.stats.hits += 1;
        if let Some(owned) = self.recency.remove(&*last) {
            self.recency.insert(tick, owned);
        }
        *last = tick;
        Some(value.clone())
    }

    /// Insert or replace `key`, evicting the least recently used entries while over capacity.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let tick = self.next_tick();
        self.stats.inserts += 1;
        let previous = self.entries.insert(key.clone(), (value, tick));
        if let Some((_, last)) = &previous {
            self.recency.remove(last);
        }
        self.recency.insert(tick, key);

        while self.entries.len() > self.capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            self.stats.evictions += 1;
        }
        previous.map(|(value, _)| value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_evicts_least_recently_used() {
        let mut lru = BoundedLru::new(2);
        lru.insert("a", 1);
        lru.insert("b", 2);
        assert_eq!(lru.get("a"), Some(1));
        lru.insert("c", 3);

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.get("b"), None);
        assert_eq!(lru.get("a"), Some(1));
        assert_eq!(lru.get("c"), Some(3));
        assert_eq!(lru.stats().evictions, 1);
    }

    #[test]
    fn test_replacing_a_key_does_not_grow() {
        let mut lru = BoundedLru::new(2);
        lru.insert("a", 1);
        assert_eq!(lru.insert("a", 2), Some(1));
        assert_eq!(lru.len(), 1);
        lru.insert("b", 3);
        lru.insert("c", 4);
        // Replacing refreshes "a", but it is still older than "b" and "c"
        assert_eq!(lru.get("a"), None);
        let stats = lru.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_ratio(), 0.0);
    }
}
