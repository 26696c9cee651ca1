/// Cache configuration per entity type
///
/// TTLs and capacities tuned for the pipeline's access patterns:
/// - Token metadata: long TTL (changes rarely, expensive to fetch)
/// - Wallet records: short TTL (group assignments may change)
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for cached entries
    pub ttl: Duration,

    /// Maximum number of entries (LRU eviction when exceeded)
    pub capacity: usize,
}

impl CacheConfig {
    /// Token metadata cache (positive entries live a day)
    pub fn token_metadata(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            capacity,
        }
    }

    /// Wallet record cache consulted on every dispatched message
    pub fn wallet_records(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            capacity,
        }
    }

    /// Custom configuration
    pub fn custom(ttl_secs: u64, capacity: usize) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            capacity,
        }
    }
}
