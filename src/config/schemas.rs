/// All configuration structures defined once with embedded defaults.
///
/// Every section maps to a TOML table in `data/config.toml`. Missing fields
/// fall back to the defaults declared here, so a partial config file is fine.
use crate::config_struct;

config_struct! {
    /// Upstream Yellowstone gRPC subscription settings
    pub struct StreamConfig {
        /// gRPC endpoint URL
        endpoint: String = String::new(),
        /// Optional x-token auth header
        x_token: String = String::new(),
        /// Maximum watched addresses per subscription shard
        chunk_size: usize = 1000,
        /// Delay between successive shard connects during a rebuild
        connect_stagger_ms: u64 = 100,
        /// Reconnect attempts before a shard is marked FAILED
        max_reconnect_attempts: u32 = 10,
        /// Initial reconnect backoff
        backoff_initial_secs: u64 = 5,
        /// Backoff ceiling
        backoff_max_secs: u64 = 30,
        /// HTTP/2 keepalive ping interval
        keepalive_secs: u64 = 30,
        /// Maximum inbound message size in MiB
        max_message_mib: usize = 50,
        /// Connect timeout
        connect_timeout_secs: u64 = 10,
    }
}

config_struct! {
    /// Ingest dispatcher batching and worker-pool settings
    pub struct IngestConfig {
        /// Flush the batch at this many distinct signatures
        batch_size: usize = 50,
        /// Flush the batch this long after the first arrival
        batch_timeout_ms: u64 = 200,
        /// Parallel workers per flush
        worker_count: usize = 8,
        /// Wallet record cache TTL
        wallet_cache_ttl_secs: u64 = 300,
        /// Wallet record cache capacity
        wallet_cache_capacity: usize = 20000,
        /// Recently-seen signature set cap (halved when exceeded)
        recent_cap: usize = 5000,
        /// Long-term processed signature set cap (halved when exceeded)
        processed_cap: usize = 50000,
        /// Drain deadline for the in-flight batch on shutdown
        drain_deadline_secs: u64 = 30,
    }
}

config_struct! {
    /// Buy/sell classification thresholds
    pub struct ClassifierConfig {
        /// A SOL outflow must exceed this to count as a buy (fee floor)
        buy_threshold_sol: f64 = 0.01,
        /// A SOL inflow must exceed this to count as a sell (dust floor)
        sell_threshold_sol: f64 = 0.001,
    }
}

config_struct! {
    /// SQLite persistence settings
    pub struct DatabaseConfig {
        path: String = crate::global::EVENTS_DATABASE.to_string(),
    }
}

config_struct! {
    /// Token metadata resolver settings
    pub struct MetadataConfig {
        /// Positive-entry TTL for both cache tiers
        cache_ttl_secs: u64 = 86400,
        /// Process-local cache capacity
        local_capacity: usize = 10000,
        /// Page size for getSignaturesForAddress when hunting the first signature
        first_sig_page_size: usize = 1000,
        /// Maximum pages walked backwards before giving up
        first_sig_max_pages: usize = 5,
        /// Disk tier path
        shared_cache_path: String = crate::global::TOKEN_META_CACHE.to_string(),
    }
}

config_struct! {
    /// SOL price oracle settings
    pub struct SolPriceConfig {
        refresh_interval_secs: u64 = 30,
        request_timeout_secs: u64 = 8,
        /// Callers treat a cached price older than this as stale
        freshness_window_secs: u64 = 60,
    }
}

config_struct! {
    /// Blockchain RPC settings
    pub struct RpcConfig {
        url: String = "https://api.mainnet-beta.solana.com".to_string(),
        timeout_secs: u64 = 10,
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub ingest: IngestConfig,
    pub classifier: ClassifierConfig,
    pub database: DatabaseConfig,
    pub metadata: MetadataConfig,
    pub sol_price: SolPriceConfig,
    pub rpc: RpcConfig,
}
