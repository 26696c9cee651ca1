/// Subscription Manager
///
/// Single owner of the shard set and the logical watched address set `W`.
/// All mutations (`replace_address_set`, `subscribe`, `unsubscribe`) are
/// serialised through one async mutex; readers take cheap `Arc` snapshots of
/// the watched set and never observe a half-built partition.
///
/// Changing the active group is deliberately NOT an address-set change: the
/// upstream stays subscribed to the full set and the dispatcher filters.
use crate::logger::{self, LogTag};
use crate::stream::decode::TxPayload;
use crate::stream::shard::{spawn_shard, ShardConfig, ShardHandle, ShardState};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

struct ManagerInner {
    /// Ordered logical set; partition order follows insertion order
    addresses: Vec<String>,
    shards: Vec<ShardHandle>,
}

/// Owns the sharded upstream subscriptions
pub struct SubscriptionManager {
    config: ShardConfig,
    chunk_size: usize,
    connect_stagger: Duration,
    sender: mpsc::Sender<TxPayload>,
    inner: Mutex<ManagerInner>,
    /// Snapshot of `W` for lock-free membership checks in the dispatcher
    watched: StdRwLock<Arc<HashSet<String>>>,
    /// Active group filter consulted by the dispatcher; None = all groups
    active_group: StdRwLock<Option<String>>,
    running: AtomicBool,
}

impl SubscriptionManager {
    pub fn new(sender: mpsc::Sender<TxPayload>) -> Self {
        let (chunk_size, stagger_ms) = crate::config::with_config(|cfg| {
            (cfg.stream.chunk_size, cfg.stream.connect_stagger_ms)
        });

        Self {
            config: ShardConfig::from_config(),
            chunk_size,
            connect_stagger: Duration::from_millis(stagger_ms),
            sender,
            inner: Mutex::new(ManagerInner {
                addresses: Vec::new(),
                shards: Vec::new(),
            }),
            watched: StdRwLock::new(Arc::new(HashSet::new())),
            active_group: StdRwLock::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Start streaming over an initial address set
    pub async fn start(&self, addresses: Vec<String>) -> Result<(), String> {
        self.running.store(true, Ordering::SeqCst);
        self.replace_address_set(addresses).await
    }

    /// Stop-and-rebuild over a new address set.
    ///
    /// Ends every current stream (best-effort), partitions the set into
    /// chunks and brings up fresh shards with a short stagger so the upstream
    /// is not hit with hundreds of simultaneous subscribes.
    pub async fn replace_address_set(&self, addresses: Vec<String>) -> Result<(), String> {
        let mut inner = self.inner.lock().await;

        // Tear down current shards
        for shard in inner.shards.drain(..) {
            shard.shut_down();
        }

        // Deduplicate while keeping order stable
        let mut seen = HashSet::new();
        let addresses: Vec<String> = addresses
            .into_iter()
            .filter(|a| seen.insert(a.clone()))
            .collect();

        // Publish the new snapshot before shards come up so no message can
        // race ahead of the membership check
        {
            let mut watched = self.watched.write().unwrap();
            *watched = Arc::new(addresses.iter().cloned().collect());
        }

        let partitions = partition_addresses(&addresses, self.chunk_size);
        logger::info(
            LogTag::Stream,
            &format!(
                "Rebuilding subscriptions: {} addresses across {} shard(s)",
                addresses.len(),
                partitions.len()
            ),
        );

        inner.addresses = addresses;

        if !self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        for (id, chunk) in partitions.into_iter().enumerate() {
            let handle = spawn_shard(id, chunk, self.config.clone(), self.sender.clone());
            inner.shards.push(handle);

            tokio::time::sleep(self.connect_stagger).await;
        }

        Ok(())
    }

    /// Add addresses to `W`; rebuilds the shard set when running
    pub async fn subscribe(&self, addrs: Vec<String>) -> Result<(), String> {
        let merged = {
            let inner = self.inner.lock().await;
            let mut merged = inner.addresses.clone();
            let existing: HashSet<&String> = merged.iter().collect();
            let additions: Vec<String> = addrs
                .into_iter()
                .filter(|a| !existing.contains(a))
                .collect();
            drop(existing);
            merged.extend(additions);
            merged
        };

        self.replace_address_set(merged).await
    }

    /// Remove addresses from `W`; rebuilds the shard set when running
    pub async fn unsubscribe(&self, addrs: Vec<String>) -> Result<(), String> {
        let removal: HashSet<String> = addrs.into_iter().collect();
        let remaining = {
            let inner = self.inner.lock().await;
            inner
                .addresses
                .iter()
                .filter(|a| !removal.contains(*a))
                .cloned()
                .collect::<Vec<_>>()
        };

        self.replace_address_set(remaining).await
    }

    /// Set the active group filter. Does not touch the subscriptions.
    pub fn switch_group(&self, group_id: Option<String>) {
        let mut active = self.active_group.write().unwrap();
        logger::info(
            LogTag::Stream,
            &format!(
                "Active group filter: {}",
                group_id.as_deref().unwrap_or("(all)")
            ),
        );
        *active = group_id;
    }

    /// Current active group filter
    pub fn active_group(&self) -> Option<String> {
        self.active_group.read().unwrap().clone()
    }

    /// Cheap snapshot of the watched set for membership checks
    pub fn watched_snapshot(&self) -> Arc<HashSet<String>> {
        self.watched.read().unwrap().clone()
    }

    /// Per-shard states for health reporting: (id, state, address count)
    pub async fn shard_states(&self) -> Vec<(usize, ShardState, usize)> {
        let inner = self.inner.lock().await;
        inner
            .shards
            .iter()
            .map(|s| (s.id, s.state(), s.addresses.len()))
            .collect()
    }

    /// Respawn shards that exhausted their reconnect budget
    pub async fn restart_failed_shards(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let mut restarted = 0;

        for shard in inner.shards.iter_mut() {
            if shard.state() == ShardState::Failed {
                let id = shard.id;
                let addresses = shard.addresses.clone();
                shard.shut_down();

                *shard = spawn_shard(id, addresses, self.config.clone(), self.sender.clone());
                restarted += 1;
            }
        }

        if restarted > 0 {
            logger::info(
                LogTag::Stream,
                &format!("Restarted {} failed shard(s)", restarted),
            );
        }
        restarted
    }

    /// Stop all shards and clear the running flag
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        let mut inner = self.inner.lock().await;
        let count = inner.shards.len();
        for shard in inner.shards.drain(..) {
            shard.shut_down();
        }

        logger::info(
            LogTag::Stream,
            &format!("Subscription manager stopped ({} shard(s))", count),
        );
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Partition an ordered address list into shard-sized chunks.
///
/// The chunks partition the input: every address appears in exactly one
/// chunk and no chunk exceeds `chunk_size`.
pub fn partition_addresses(addresses: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    if addresses.is_empty() {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    addresses
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("addr{}", i)).collect()
    }

    #[test]
    fn partition_covers_and_is_disjoint() {
        let addrs = addresses(2501);
        let partitions = partition_addresses(&addrs, 1000);

        assert_eq!(partitions.len(), 3);
        assert!(partitions.iter().all(|p| p.len() <= 1000));

        let mut union = HashSet::new();
        let mut total = 0;
        for partition in &partitions {
            total += partition.len();
            for addr in partition {
                assert!(union.insert(addr.clone()), "duplicate {}", addr);
            }
        }

        assert_eq!(total, addrs.len());
        assert_eq!(union.len(), addrs.len());
        for addr in &addrs {
            assert!(union.contains(addr));
        }
    }

    #[test]
    fn partition_exact_multiple() {
        let addrs = addresses(2000);
        let partitions = partition_addresses(&addrs, 1000);
        assert_eq!(partitions.len(), 2);
        assert!(partitions.iter().all(|p| p.len() == 1000));
    }

    #[test]
    fn partition_empty_set() {
        let partitions = partition_addresses(&[], 1000);
        assert!(partitions.is_empty());
    }

    #[test]
    fn partition_small_set_single_shard() {
        let addrs = addresses(5);
        let partitions = partition_addresses(&addrs, 1000);
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].len(), 5);
    }
}
