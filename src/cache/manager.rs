/// Generic TTL + LRU cache for the pipeline's hot lookups
///
/// Backs the wallet-record lookups in the dispatcher (every inbound message
/// consults it) and the process-local tier of the metadata resolver. One
/// `RwLock` guards the whole cache state; at the capacities used here
/// (thousands to tens of thousands of entries) a single lock beats juggling
/// separate locks for data, recency and metrics.
///
/// Recency is a monotonic use counter stamped on every touch. Eviction scans
/// for the coldest entry, which keeps inserts O(n) in the worst case but
/// only once the cache is full - acceptable for lookup-dominated workloads.
use super::config::CacheConfig;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::Instant;

/// One cached value plus its bookkeeping
struct Slot<V> {
    value: V,
    stored_at: Instant,
    /// Use-counter stamp of the most recent access
    last_used: u64,
}

/// Hit/miss accounting, readable at any time for health reporting
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub inserts: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner<K, V> {
    slots: HashMap<K, Slot<V>>,
    /// Monotonic counter driving LRU ordering
    clock: u64,
    metrics: CacheMetrics,
}

impl<K, V> CacheInner<K, V>
where
    K: Clone + Eq + Hash,
{
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Drop the entry with the smallest use stamp
    fn evict_coldest(&mut self) {
        let coldest = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(key, _)| key.clone());

        if let Some(key) = coldest {
            self.slots.remove(&key);
            self.metrics.evictions += 1;
        }
    }
}

/// Thread-safe TTL + LRU cache
pub struct CacheManager<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    config: CacheConfig,
    inner: RwLock<CacheInner<K, V>>,
}

impl<K, V> CacheManager<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(CacheInner {
                slots: HashMap::new(),
                clock: 0,
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Fetch a live entry, refreshing its recency. Expired entries are
    /// removed on the way out and count as misses.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write().unwrap();

        let expired = match inner.slots.get(key) {
            Some(slot) => slot.stored_at.elapsed() > self.config.ttl,
            None => {
                inner.metrics.misses += 1;
                return None;
            }
        };

        if expired {
            inner.slots.remove(key);
            inner.metrics.misses += 1;
            inner.metrics.expirations += 1;
            return None;
        }

        let stamp = inner.tick();
        let slot = inner.slots.get_mut(key).unwrap();
        slot.last_used = stamp;
        let value = slot.value.clone();
        inner.metrics.hits += 1;
        Some(value)
    }

    /// Store a value, evicting the coldest entry when full. Overwriting an
    /// existing key refreshes both its TTL and its recency.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.write().unwrap();

        if !inner.slots.contains_key(&key) && inner.slots.len() >= self.config.capacity {
            inner.evict_coldest();
        }

        let stamp = inner.tick();
        inner.slots.insert(
            key,
            Slot {
                value,
                stored_at: Instant::now(),
                last_used: stamp,
            },
        );
        inner.metrics.inserts += 1;
    }

    /// Drop one entry (used when a wallet or mint is invalidated)
    pub fn remove(&self, key: &K) {
        let mut inner = self.inner.write().unwrap();
        inner.slots.remove(key);
    }

    /// Drop everything, keeping the accumulated metrics
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.slots.clear();
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner.read().unwrap().metrics.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn wallet_cache(ttl_secs: u64, capacity: usize) -> CacheManager<String, String> {
        CacheManager::new(CacheConfig::custom(ttl_secs, capacity))
    }

    #[test]
    fn lookup_hits_and_misses_are_counted() {
        let cache = wallet_cache(60, 100);

        cache.insert("walletA".to_string(), "group-1".to_string());
        assert_eq!(cache.get(&"walletA".to_string()), Some("group-1".to_string()));
        assert_eq!(cache.get(&"walletB".to_string()), None);

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.inserts, 1);
        assert!((metrics.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = wallet_cache(1, 100);

        cache.insert("mintX".to_string(), "meta".to_string());
        assert!(cache.get(&"mintX".to_string()).is_some());

        thread::sleep(Duration::from_secs(2));
        assert_eq!(cache.get(&"mintX".to_string()), None);
        assert_eq!(cache.metrics().expirations, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_evicts_the_coldest_entry() {
        let cache = wallet_cache(60, 2);

        cache.insert("walletA".to_string(), "a".to_string());
        cache.insert("walletB".to_string(), "b".to_string());

        // Touch A so B becomes the coldest
        assert!(cache.get(&"walletA".to_string()).is_some());

        cache.insert("walletC".to_string(), "c".to_string());

        assert!(cache.get(&"walletB".to_string()).is_none());
        assert!(cache.get(&"walletA".to_string()).is_some());
        assert!(cache.get(&"walletC".to_string()).is_some());
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn overwrite_refreshes_recency_without_eviction() {
        let cache = wallet_cache(60, 2);

        cache.insert("walletA".to_string(), "old".to_string());
        cache.insert("walletB".to_string(), "b".to_string());
        // Overwriting an existing key must not evict anyone
        cache.insert("walletA".to_string(), "new".to_string());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"walletA".to_string()), Some("new".to_string()));
        assert_eq!(cache.metrics().evictions, 0);
    }

    #[test]
    fn remove_and_clear() {
        let cache = wallet_cache(60, 100);

        cache.insert("walletA".to_string(), "a".to_string());
        cache.insert("walletB".to_string(), "b".to_string());

        cache.remove(&"walletA".to_string());
        assert!(cache.get(&"walletA".to_string()).is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
