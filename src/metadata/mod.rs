/// Token Metadata Resolver
///
/// Given a mint address, returns `{symbol, name, decimals, deployment_time}`
/// through a two-tier cache hierarchy:
///
/// 1. Process-local TTL/LRU cache (24h for positive entries)
/// 2. Shared disk-backed JSON cache under `data/` (same TTL, survives restarts)
/// 3. On-chain fallback: mint account read (decimals) + Metaplex metadata PDA
///    (symbol/name) + a backward page-walk over the mint's signature history
///    for the first deployment time
///
/// Failed upstream fetches degrade to a synthetic placeholder which is still
/// cached for the TTL, so a permanently broken mint cannot stampede the RPC.
/// Concurrent requests for the same mint collapse onto one in-flight fetch.
pub mod disk_cache;

use crate::cache::{CacheConfig, CacheManager};
use crate::config::with_config;
use crate::database::Database;
use crate::logger::{self, LogTag};
use crate::rpc::ChainRpc;
use disk_cache::DiskMetaCache;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, Mutex};

/// Resolved token metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenMeta {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Unix seconds of the mint's earliest observed signature
    pub deployment_time: Option<i64>,
}

impl TokenMeta {
    /// Placeholder used when on-chain lookups fail or metadata is absent
    pub fn synthetic(mint: &str) -> Self {
        let head: String = mint.chars().take(4).collect();
        let prefix: String = mint.chars().take(8).collect();
        Self {
            mint: mint.to_string(),
            symbol: head.to_uppercase(),
            name: format!("Token {}...", prefix),
            decimals: crate::constants::FALLBACK_TOKEN_DECIMALS,
            deployment_time: None,
        }
    }
}

/// Two-tier cached metadata resolver with per-mint single-flight
pub struct TokenMetadataResolver {
    rpc: Arc<ChainRpc>,
    db: Arc<Database>,
    local: CacheManager<String, TokenMeta>,
    shared: StdMutex<DiskMetaCache>,
    in_flight: Mutex<HashMap<String, broadcast::Sender<TokenMeta>>>,
    ttl_secs: u64,
    page_size: usize,
    max_pages: usize,
}

impl TokenMetadataResolver {
    pub fn new(rpc: Arc<ChainRpc>, db: Arc<Database>) -> Self {
        let (ttl_secs, capacity, page_size, max_pages, shared_path) = with_config(|cfg| {
            (
                cfg.metadata.cache_ttl_secs,
                cfg.metadata.local_capacity,
                cfg.metadata.first_sig_page_size,
                cfg.metadata.first_sig_max_pages,
                cfg.metadata.shared_cache_path.clone(),
            )
        });

        let shared = DiskMetaCache::load_from_file(&shared_path).unwrap_or_else(|e| {
            logger::warning(
                LogTag::Metadata,
                &format!("Failed to load shared metadata cache: {}", e),
            );
            DiskMetaCache::new(&shared_path)
        });

        Self {
            rpc,
            db,
            local: CacheManager::new(CacheConfig::token_metadata(ttl_secs, capacity)),
            shared: StdMutex::new(shared),
            in_flight: Mutex::new(HashMap::new()),
            ttl_secs,
            page_size,
            max_pages,
        }
    }

    /// Resolve metadata for a batch of mints.
    ///
    /// Every requested mint is present in the result; entries that could not
    /// be fetched carry the synthetic placeholder.
    pub async fn resolve_many(&self, mints: &[String]) -> HashMap<String, TokenMeta> {
        let futures: Vec<_> = mints.iter().map(|mint| self.resolve(mint)).collect();
        let resolved = join_all(futures).await;

        mints
            .iter()
            .cloned()
            .zip(resolved.into_iter())
            .collect()
    }

    /// Resolve metadata for one mint through the cache hierarchy.
    pub async fn resolve(&self, mint: &str) -> TokenMeta {
        loop {
            // Tier 1: process-local cache
            if let Some(meta) = self.local.get(&mint.to_string()) {
                return meta;
            }

            // Tier 2: shared disk cache
            let shared_hit = {
                let shared = self.shared.lock().unwrap();
                shared.get(mint, self.ttl_secs)
            };
            if let Some(meta) = shared_hit {
                self.local.insert(mint.to_string(), meta.clone());
                return meta;
            }

            // Single-flight: only one task fetches a given mint at a time.
            // Waiters subscribe under the map lock, so the owner cannot
            // complete and remove the entry before the subscription exists.
            let waiter = {
                let mut in_flight = self.in_flight.lock().await;
                match in_flight.get(mint) {
                    Some(sender) => Some(sender.subscribe()),
                    None => {
                        let (sender, _) = broadcast::channel(1);
                        in_flight.insert(mint.to_string(), sender);
                        None
                    }
                }
            };

            if let Some(mut waiter) = waiter {
                match waiter.recv().await {
                    Ok(meta) => return meta,
                    // Owner died before broadcasting; retry from the caches
                    Err(_) => continue,
                }
            }

            // We own the fetch. Store into the caches before dropping the
            // in-flight entry so late arrivals hit the cache instead.
            let meta = self.fetch_from_chain(mint).await;
            self.store(meta.clone());

            let sender = {
                let mut in_flight = self.in_flight.lock().await;
                in_flight.remove(mint)
            };
            if let Some(sender) = sender {
                let _ = sender.send(meta.clone());
            }

            return meta;
        }
    }

    /// Warm the process-local tier with already-known metadata, bypassing the
    /// fetch path. Used at startup with rows from the relational store.
    pub fn prime(&self, meta: TokenMeta) {
        self.local.insert(meta.mint.clone(), meta);
    }

    /// Drop cached entries for a mint (both tiers).
    pub fn invalidate(&self, mint: &str) {
        self.local.remove(&mint.to_string());
        let mut shared = self.shared.lock().unwrap();
        shared.remove(mint);
    }

    fn store(&self, meta: TokenMeta) {
        self.local.insert(meta.mint.clone(), meta.clone());

        {
            let mut shared = self.shared.lock().unwrap();
            shared.insert(meta.clone());
            if let Err(e) = shared.save() {
                logger::warning(
                    LogTag::Metadata,
                    &format!("Failed to persist shared metadata cache: {}", e),
                );
            }
        }

        // Relational row: COALESCE keeps the earliest known deployment time
        if let Err(e) = self.db.upsert_token(&meta) {
            logger::warning(
                LogTag::Metadata,
                &format!("Failed to upsert token {}: {}", meta.mint, e),
            );
        }
    }

    /// On-chain fetch path. Never errors: failures degrade to the synthetic
    /// placeholder so the entry still gets cached for the TTL.
    async fn fetch_from_chain(&self, mint: &str) -> TokenMeta {
        let mut meta = TokenMeta::synthetic(mint);

        match self.rpc.get_mint_decimals(mint).await {
            Ok(decimals) => meta.decimals = decimals,
            Err(e) => {
                logger::warning(
                    LogTag::Metadata,
                    &format!("Mint account read failed for {}: {}", mint, e),
                );
            }
        }

        match self.rpc.get_token_symbol_name(mint).await {
            Ok(Some((symbol, name))) => {
                if !symbol.is_empty() {
                    meta.symbol = symbol;
                }
                if !name.is_empty() {
                    meta.name = name;
                }
            }
            Ok(None) => {}
            Err(e) => {
                logger::warning(
                    LogTag::Metadata,
                    &format!("Metadata account read failed for {}: {}", mint, e),
                );
            }
        }

        meta.deployment_time = self.first_deployment_time(mint).await;

        meta
    }

    /// Best-effort first deployment time: walk the signature history backwards
    /// and take the block time of the earliest signature reached.
    async fn first_deployment_time(&self, mint: &str) -> Option<i64> {
        let mut earliest: Option<crate::rpc::SignatureRecord> = None;
        let mut before: Option<String> = None;

        for _ in 0..self.max_pages {
            let page = match self
                .rpc
                .signatures_for_address(mint, before.as_deref(), self.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    logger::debug(
                        LogTag::Metadata,
                        &format!("Signature page fetch failed for {}: {}", mint, e),
                    );
                    break;
                }
            };

            if page.is_empty() {
                break;
            }

            let last = page.last().cloned();
            let full_page = page.len() >= self.page_size;
            earliest = last.clone();
            before = last.map(|r| r.signature);

            if !full_page {
                break;
            }
        }

        let earliest = earliest?;

        if earliest.block_time.is_some() {
            return earliest.block_time;
        }

        // The history entry had no block time; fetch the transaction itself
        match self.rpc.transaction_block_time(&earliest.signature).await {
            Ok(block_time) => block_time,
            Err(e) => {
                logger::debug(
                    LogTag::Metadata,
                    &format!("First-signature lookup failed for {}: {}", mint, e),
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_placeholder_shape() {
        let meta = TokenMeta::synthetic("ABcdEFghIJklMNopQRstUVwxYZ1234567890abcdEFGH");
        assert_eq!(meta.symbol, "ABCD");
        assert_eq!(meta.name, "Token ABcdEFgh...");
        assert_eq!(meta.decimals, crate::constants::FALLBACK_TOKEN_DECIMALS);
        assert_eq!(meta.deployment_time, None);
    }
}
