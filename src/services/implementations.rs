/// Concrete service wrappers for the pipeline components
///
/// Startup order (by priority): SOL price oracle → ingest dispatcher →
/// subscription manager. The stream comes up last so every payload finds a
/// running dispatcher; on shutdown the reverse order lets the dispatcher
/// drain messages the shards already delivered.
use crate::database::Database;
use crate::dedup::SignatureDedup;
use crate::dispatcher::{spawn_maintenance, DispatcherContext, IngestDispatcher};
use crate::logger::{self, LogTag};
use crate::services::{Service, ServiceHealth};
use crate::sol_price;
use crate::stream::{ShardState, SubscriptionManager};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

// =============================================================================
// SOL PRICE SERVICE
// =============================================================================

pub struct SolPriceService;

#[async_trait]
impl Service for SolPriceService {
    fn name(&self) -> &'static str {
        "sol-price"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let handle = sol_price::start_sol_price_service(shutdown).await?;
        Ok(vec![handle])
    }

    async fn stop(&mut self) -> Result<(), String> {
        sol_price::stop_sol_price_service().await;
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        if !sol_price::is_sol_price_service_running() {
            return ServiceHealth::Unhealthy("price task not running".to_string());
        }
        match sol_price::get_sol_price_info() {
            Some(info) if info.is_valid => ServiceHealth::Healthy,
            Some(info) => ServiceHealth::Degraded(format!(
                "price cache invalid ({} consecutive errors)",
                info.error_count
            )),
            None => ServiceHealth::Unhealthy("price cache unreadable".to_string()),
        }
    }
}

// =============================================================================
// INGEST DISPATCHER SERVICE
// =============================================================================

pub struct DispatcherService {
    dispatcher: Option<IngestDispatcher>,
    ctx: Arc<DispatcherContext>,
    dedup: Arc<SignatureDedup>,
}

impl DispatcherService {
    pub fn new(
        dispatcher: IngestDispatcher,
        ctx: Arc<DispatcherContext>,
        dedup: Arc<SignatureDedup>,
    ) -> Self {
        Self {
            dispatcher: Some(dispatcher),
            ctx,
            dedup,
        }
    }
}

#[async_trait]
impl Service for DispatcherService {
    fn name(&self) -> &'static str {
        "ingest-dispatcher"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn start(&mut self, shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let dispatcher = self
            .dispatcher
            .take()
            .ok_or("Dispatcher already started")?;

        let run_handle = tokio::spawn(dispatcher.run(shutdown.clone()));
        let maintenance_handle = spawn_maintenance(self.dedup.clone(), shutdown);

        Ok(vec![run_handle, maintenance_handle])
    }

    async fn health(&self) -> ServiceHealth {
        let stats = self.ctx.counters.snapshot();
        if stats.persist_failures > 0 && stats.persisted == 0 {
            ServiceHealth::Unhealthy(format!(
                "{} persist failures, nothing persisted",
                stats.persist_failures
            ))
        } else if stats.persist_failures > 0 {
            ServiceHealth::Degraded(format!("{} persist failures", stats.persist_failures))
        } else {
            ServiceHealth::Healthy
        }
    }
}

// =============================================================================
// SUBSCRIPTION STREAM SERVICE
// =============================================================================

pub struct StreamService {
    manager: Arc<SubscriptionManager>,
    db: Arc<Database>,
}

impl StreamService {
    pub fn new(manager: Arc<SubscriptionManager>, db: Arc<Database>) -> Self {
        Self { manager, db }
    }
}

#[async_trait]
impl Service for StreamService {
    fn name(&self) -> &'static str {
        "subscription-stream"
    }

    fn priority(&self) -> i32 {
        30
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["ingest-dispatcher"]
    }

    async fn start(&mut self, _shutdown: Arc<Notify>) -> Result<Vec<JoinHandle<()>>, String> {
        let addresses = self
            .db
            .all_active_addresses()
            .map_err(|e| format!("Failed to load watched wallets: {}", e))?;

        logger::info(
            LogTag::Stream,
            &format!("Loaded {} watched wallet(s) from store", addresses.len()),
        );

        // Shard tasks are owned by the manager, not the service manager
        self.manager.start(addresses).await?;
        Ok(vec![])
    }

    async fn stop(&mut self) -> Result<(), String> {
        self.manager.stop().await;
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        let states = self.manager.shard_states().await;
        if states.is_empty() {
            return if self.manager.is_running() {
                // Empty watched set is a valid idle state
                ServiceHealth::Healthy
            } else {
                ServiceHealth::Stopping
            };
        }

        let failed = states
            .iter()
            .filter(|(_, state, _)| *state == ShardState::Failed)
            .count();

        if failed == states.len() {
            ServiceHealth::Unhealthy(format!("all {} shard(s) failed", failed))
        } else if failed > 0 {
            ServiceHealth::Degraded(format!("{}/{} shard(s) failed", failed, states.len()))
        } else {
            ServiceHealth::Healthy
        }
    }
}
