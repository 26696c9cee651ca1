/// Ingest Dispatcher
///
/// Receives decoded payloads from every stream shard, micro-batches them, and
/// drives each message through the pipeline:
///
/// ```text
/// dedup hot set → watched-wallet match → wallet record (cached) →
/// group filter → classify → metadata enrichment → persist → fanout
/// ```
///
/// Batching is keyed by signature, which flattens bursts for free. A flush
/// processes messages in parallel bounded by a worker semaphore. Publish only
/// happens after the database commit returns success, and a persist failure
/// leaves the signature in the hot set so a near-immediate replay stays
/// suppressed while a later fresh delivery can retry.
use crate::cache::{CacheConfig, CacheManager};
use crate::classifier::{classify, Thresholds};
use crate::config::with_config;
use crate::database::{Database, PersistOutcome, WalletRecord};
use crate::dedup::SignatureDedup;
use crate::fanout::{FanoutBus, PublishedEvent};
use crate::logger::{self, LogTag};
use crate::metadata::TokenMetadataResolver;
use crate::stream::decode::TxPayload;
use crate::stream::SubscriptionManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify, Semaphore};

// =============================================================================
// COUNTERS
// =============================================================================

/// Drop/success counters for every pipeline outcome
#[derive(Debug, Default)]
pub struct DispatchCounters {
    pub received: AtomicU64,
    pub duplicates: AtomicU64,
    pub unknown_wallet: AtomicU64,
    pub group_filtered: AtomicU64,
    pub below_threshold: AtomicU64,
    pub persisted: AtomicU64,
    pub published: AtomicU64,
    pub persist_failures: AtomicU64,
}

/// Point-in-time counter snapshot for health reporting
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub received: u64,
    pub duplicates: u64,
    pub unknown_wallet: u64,
    pub group_filtered: u64,
    pub below_threshold: u64,
    pub persisted: u64,
    pub published: u64,
    pub persist_failures: u64,
}

impl DispatchCounters {
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            received: self.received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            unknown_wallet: self.unknown_wallet.load(Ordering::Relaxed),
            group_filtered: self.group_filtered.load(Ordering::Relaxed),
            below_threshold: self.below_threshold.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Shared collaborators handed to every worker
pub struct DispatcherContext {
    pub db: Arc<Database>,
    pub dedup: Arc<SignatureDedup>,
    pub fanout: Arc<FanoutBus>,
    pub resolver: Arc<TokenMetadataResolver>,
    pub manager: Arc<SubscriptionManager>,
    pub wallet_cache: CacheManager<String, WalletRecord>,
    pub counters: DispatchCounters,
    /// Numeric price source; the classifier never talks to the oracle itself
    pub sol_price_source: fn() -> f64,
}

impl DispatcherContext {
    pub fn new(
        db: Arc<Database>,
        dedup: Arc<SignatureDedup>,
        fanout: Arc<FanoutBus>,
        resolver: Arc<TokenMetadataResolver>,
        manager: Arc<SubscriptionManager>,
    ) -> Self {
        let (ttl, capacity) = with_config(|cfg| {
            (
                cfg.ingest.wallet_cache_ttl_secs,
                cfg.ingest.wallet_cache_capacity,
            )
        });

        Self {
            db,
            dedup,
            fanout,
            resolver,
            manager,
            wallet_cache: CacheManager::new(CacheConfig::wallet_records(ttl, capacity)),
            counters: DispatchCounters::default(),
            sol_price_source: crate::sol_price::get_sol_price,
        }
    }

    /// Wallet record through the short-TTL cache, falling back to the store
    fn wallet_record(&self, address: &str) -> Option<WalletRecord> {
        if let Some(record) = self.wallet_cache.get(&address.to_string()) {
            return Some(record);
        }

        match self.db.wallet_by_address(address) {
            Ok(Some(record)) => {
                self.wallet_cache.insert(address.to_string(), record.clone());
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                logger::warning(
                    LogTag::Wallet,
                    &format!("Wallet lookup failed for {}: {}", address, e),
                );
                None
            }
        }
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// Batching loop plus bounded-parallel flush processing
pub struct IngestDispatcher {
    ctx: Arc<DispatcherContext>,
    receiver: mpsc::Receiver<TxPayload>,
    batch_size: usize,
    batch_timeout: Duration,
    worker_count: usize,
    drain_deadline: Duration,
}

impl IngestDispatcher {
    pub fn new(ctx: Arc<DispatcherContext>, receiver: mpsc::Receiver<TxPayload>) -> Self {
        let (batch_size, batch_timeout_ms, worker_count, drain_deadline_secs) =
            with_config(|cfg| {
                (
                    cfg.ingest.batch_size,
                    cfg.ingest.batch_timeout_ms,
                    cfg.ingest.worker_count,
                    cfg.ingest.drain_deadline_secs,
                )
            });

        Self {
            ctx,
            receiver,
            batch_size: batch_size.max(1),
            batch_timeout: Duration::from_millis(batch_timeout_ms),
            worker_count: worker_count.max(1),
            drain_deadline: Duration::from_secs(drain_deadline_secs),
        }
    }

    /// Main loop: collect, flush on size or age, drain on shutdown
    pub async fn run(self, shutdown: Arc<Notify>) {
        let IngestDispatcher {
            ctx,
            mut receiver,
            batch_size,
            batch_timeout,
            worker_count,
            drain_deadline,
        } = self;

        logger::info(LogTag::Ingest, "Ingest dispatcher started");

        // Batch keyed by signature: burst duplicates collapse on arrival
        let mut batch: HashMap<String, TxPayload> = HashMap::new();
        let mut first_arrival: Option<Instant> = None;

        loop {
            let timeout_at = first_arrival.map(|t| t + batch_timeout);

            tokio::select! {
                _ = shutdown.notified() => {
                    if !batch.is_empty() {
                        logger::info(
                            LogTag::Ingest,
                            &format!("Draining {} in-flight message(s)", batch.len()),
                        );
                        let drained = std::mem::take(&mut batch);
                        let flush = flush_batch(ctx.clone(), worker_count, drained);
                        if tokio::time::timeout(drain_deadline, flush).await.is_err() {
                            logger::warning(
                                LogTag::Ingest,
                                "Drain deadline exceeded, abandoning remaining work",
                            );
                        }
                    }
                    break;
                }

                maybe_payload = receiver.recv() => {
                    match maybe_payload {
                        Some(payload) => {
                            ctx.counters.received.fetch_add(1, Ordering::Relaxed);
                            if first_arrival.is_none() {
                                first_arrival = Some(Instant::now());
                            }
                            batch.insert(payload.signature.clone(), payload);

                            if batch.len() >= batch_size {
                                let full = std::mem::take(&mut batch);
                                first_arrival = None;
                                flush_batch(ctx.clone(), worker_count, full).await;
                            }
                        }
                        None => {
                            // All shard senders dropped; flush what's left
                            if !batch.is_empty() {
                                let rest = std::mem::take(&mut batch);
                                flush_batch(ctx.clone(), worker_count, rest).await;
                            }
                            break;
                        }
                    }
                }

                _ = sleep_until_opt(timeout_at), if timeout_at.is_some() => {
                    if !batch.is_empty() {
                        let aged = std::mem::take(&mut batch);
                        first_arrival = None;
                        flush_batch(ctx.clone(), worker_count, aged).await;
                    } else {
                        first_arrival = None;
                    }
                }
            }
        }

        logger::info(LogTag::Ingest, "Ingest dispatcher stopped");
    }
}

/// Process one batch in parallel, bounded by the worker pool
async fn flush_batch(
    ctx: Arc<DispatcherContext>,
    worker_count: usize,
    batch: HashMap<String, TxPayload>,
) {
    let semaphore = Arc::new(Semaphore::new(worker_count));
    let mut joins = Vec::with_capacity(batch.len());

    for (_, payload) in batch {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let worker_ctx = ctx.clone();

        joins.push(tokio::spawn(async move {
            process_message(worker_ctx, payload).await;
            drop(permit);
        }));
    }

    for join in joins {
        let _ = join.await;
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// PER-MESSAGE PIPELINE
// =============================================================================

/// Drive one payload through dedup → match → filter → classify → persist →
/// publish. Public so integration tests can exercise the pipeline without a
/// live upstream stream.
pub async fn process_message(ctx: Arc<DispatcherContext>, payload: TxPayload) {
    // Fast-path dedup
    if ctx.dedup.seen_recently(&payload.signature) {
        ctx.counters.duplicates.fetch_add(1, Ordering::Relaxed);
        return;
    }

    // Which watched wallets does this payload touch?
    let watched = ctx.manager.watched_snapshot();
    let involved: Vec<String> = payload
        .account_keys
        .iter()
        .filter(|k| watched.contains(*k))
        .cloned()
        .collect();

    if involved.is_empty() {
        ctx.counters.unknown_wallet.fetch_add(1, Ordering::Relaxed);
        return;
    }

    // Every involved wallet is handled in this single pass, so the
    // signature-level mark covers all of them
    ctx.dedup.mark_recent(&payload.signature);

    let sol_price = (ctx.sol_price_source)();
    let thresholds = Thresholds::from_config();
    let active_group = ctx.manager.active_group();

    for wallet_address in involved {
        let record = match ctx.wallet_record(&wallet_address) {
            Some(record) if record.is_active => record,
            _ => {
                ctx.counters.unknown_wallet.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        // Active group filter: mismatching wallets are dropped before
        // classification so a filtered event is never persisted
        if let Some(group) = &active_group {
            if record.group_id.as_deref() != Some(group.as_str()) {
                ctx.counters.group_filtered.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        }

        let mut event = match classify(&payload, &wallet_address, sol_price, thresholds) {
            Some(event) => event,
            None => {
                ctx.counters.below_threshold.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        // Metadata enrichment for the surviving mints
        let mints: Vec<String> = event.changes.iter().map(|c| c.mint.clone()).collect();
        let metas = ctx.resolver.resolve_many(&mints).await;
        for change in &mut event.changes {
            if let Some(meta) = metas.get(&change.mint) {
                change.symbol = meta.symbol.clone();
                change.name = meta.name.clone();
            }
        }

        match ctx.db.persist_event(&record, &event) {
            Ok(PersistOutcome::Inserted(_)) => {
                ctx.counters.persisted.fetch_add(1, Ordering::Relaxed);
                ctx.dedup.mark_processed(&event.signature);

                let published = PublishedEvent::from_classified(&event, &record);
                match ctx.fanout.publish(&published) {
                    Ok(_) => {
                        ctx.counters.published.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        logger::error(LogTag::Fanout, &e);
                    }
                }
            }
            Ok(PersistOutcome::Duplicate) => {
                // Unique constraint did its job; suppressed, not published
                ctx.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                ctx.counters
                    .persist_failures
                    .fetch_add(1, Ordering::Relaxed);
                logger::error(
                    LogTag::Database,
                    &format!(
                        "Persist failed for {} / {}: {}",
                        event.signature, wallet_address, e
                    ),
                );
            }
        }
    }
}

// =============================================================================
// MAINTENANCE
// =============================================================================

/// Periodic dedup sweeps: hourly for the recent set, daily for the long-term
/// processed set.
pub fn spawn_maintenance(
    dedup: Arc<SignatureDedup>,
    shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut hourly = tokio::time::interval(Duration::from_secs(3600));
        let mut daily = tokio::time::interval(Duration::from_secs(86400));
        // The first tick of an interval fires immediately
        hourly.tick().await;
        daily.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                _ = hourly.tick() => {
                    let dropped = dedup.hourly_sweep();
                    if dropped > 0 {
                        logger::info(
                            LogTag::Dedup,
                            &format!("Hourly sweep dropped {} recent entries", dropped),
                        );
                    }
                }
                _ = daily.tick() => {
                    let dropped = dedup.daily_sweep();
                    if dropped > 0 {
                        logger::info(
                            LogTag::Dedup,
                            &format!("Daily sweep dropped {} processed entries", dropped),
                        );
                    }
                }
            }
        }
    })
}
