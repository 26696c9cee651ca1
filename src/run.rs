/// Pipeline assembly and lifecycle
///
/// Wires the components together (store → fanout → resolver → dedup →
/// dispatcher → subscription manager), registers them with the
/// ServiceManager, and runs until a shutdown signal arrives.
use crate::database::Database;
use crate::dedup::SignatureDedup;
use crate::dispatcher::{DispatcherContext, IngestDispatcher};
use crate::fanout::FanoutBus;
use crate::logger::{self, LogTag};
use crate::metadata::TokenMetadataResolver;
use crate::rpc::ChainRpc;
use crate::services::implementations::{DispatcherService, SolPriceService, StreamService};
use crate::services::ServiceManager;
use crate::stream::SubscriptionManager;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Channel capacity between stream shards and the dispatcher
const INGEST_CHANNEL_CAPACITY: usize = 10000;

/// Full pipeline lifecycle: returns when the process should exit
pub async fn run_pipeline(config_path: &str) -> Result<(), String> {
    crate::global::ensure_data_directories()
        .map_err(|e| format!("Failed to create data directories: {}", e))?;

    logger::init_file_logging();
    logger::info(LogTag::System, "🚀 walletpulse starting up...");

    crate::config::load_config_from_path(config_path)
        .map_err(|e| format!("Failed to load config: {}", e))?;

    let (db_path, rpc_url, rpc_timeout, recent_cap, processed_cap, endpoint) =
        crate::config::with_config(|cfg| {
            (
                cfg.database.path.clone(),
                cfg.rpc.url.clone(),
                cfg.rpc.timeout_secs,
                cfg.ingest.recent_cap,
                cfg.ingest.processed_cap,
                cfg.stream.endpoint.clone(),
            )
        });

    if endpoint.is_empty() {
        return Err(
            "No gRPC endpoint configured (set GRPC_ENDPOINT or stream.endpoint)".to_string(),
        );
    }

    // Shared components, leaves first
    let db = Arc::new(Database::new(&db_path).map_err(|e| format!("Database init failed: {}", e))?);
    let fanout = Arc::new(FanoutBus::new());
    let rpc = Arc::new(ChainRpc::new(&rpc_url, rpc_timeout));
    let resolver = Arc::new(TokenMetadataResolver::new(rpc, db.clone()));
    let dedup = Arc::new(SignatureDedup::new(recent_cap, processed_cap));

    // Shards feed the dispatcher through one bounded channel
    let (tx, rx) = mpsc::channel(INGEST_CHANNEL_CAPACITY);
    let manager = Arc::new(SubscriptionManager::new(tx));

    let ctx = Arc::new(DispatcherContext::new(
        db.clone(),
        dedup.clone(),
        fanout.clone(),
        resolver,
        manager.clone(),
    ));
    let dispatcher = IngestDispatcher::new(ctx.clone(), rx);

    // Service registration
    let mut service_manager = ServiceManager::new();
    service_manager.register(Box::new(SolPriceService));
    service_manager.register(Box::new(DispatcherService::new(dispatcher, ctx.clone(), dedup)));
    service_manager.register(Box::new(StreamService::new(manager, db)));

    service_manager.start_all().await?;

    logger::success(LogTag::System, "walletpulse is running");

    crate::shutdown::wait_for_shutdown_signal().await?;

    logger::info(LogTag::System, "🛑 Initiating graceful shutdown...");
    service_manager.stop_all().await?;

    let stats = ctx.counters.snapshot();
    logger::info(
        LogTag::System,
        &format!(
            "Final counters: received={} persisted={} published={} duplicates={} failures={}",
            stats.received, stats.persisted, stats.published, stats.duplicates,
            stats.persist_failures
        ),
    );

    logger::success(LogTag::System, "Shutdown complete");
    Ok(())
}
