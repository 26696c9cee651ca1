//! In-process caching layer
//!
//! A generic TTL + LRU cache used by the hot paths of the pipeline:
//! - wallet records during dispatch (short TTL, see `IngestConfig`)
//! - the process-local tier of the token metadata resolver (24h TTL)

pub mod config;
pub mod manager;

pub use config::CacheConfig;
pub use manager::{CacheManager, CacheMetrics};
