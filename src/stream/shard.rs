/// Subscription shard
///
/// One shard owns one long-lived gRPC transaction subscription covering a
/// slice of the watched address set. The shard task drives the reconnect
/// state machine:
///
/// ```text
///    CONNECTING ──success──▶ STREAMING ──error/end──▶ BACKOFF ──▶ CONNECTING
///         │                                   ▲
///         └──── attempts ≥ MAX ────▶ FAILED ──┘  (manual restart only)
/// ```
///
/// Backoff grows 5s ×1.5 capped at 30s; the attempt counter resets on any
/// successful message, so only persistent failures exhaust a shard. A FAILED
/// shard stays down without poisoning its siblings.
use crate::errors::StreamError;
use crate::logger::{self, LogTag};
use crate::stream::decode::{decode_transaction_update, TxPayload};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use yellowstone_grpc_client::{ClientTlsConfig, GeyserGrpcClient, Interceptor};
use yellowstone_grpc_proto::prelude::{
    subscribe_update::UpdateOneof, CommitmentLevel, SubscribeRequest,
    SubscribeRequestFilterTransactions,
};

/// Connection parameters shared by every shard
#[derive(Debug, Clone)]
pub struct ShardConfig {
    pub endpoint: String,
    pub x_token: Option<String>,
    pub connect_timeout_secs: u64,
    pub keepalive_secs: u64,
    pub max_message_mib: usize,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
    pub max_reconnect_attempts: u32,
}

impl ShardConfig {
    pub fn from_config() -> Self {
        crate::config::with_config(|cfg| Self {
            endpoint: cfg.stream.endpoint.clone(),
            x_token: if cfg.stream.x_token.is_empty() {
                None
            } else {
                Some(cfg.stream.x_token.clone())
            },
            connect_timeout_secs: cfg.stream.connect_timeout_secs,
            keepalive_secs: cfg.stream.keepalive_secs,
            max_message_mib: cfg.stream.max_message_mib,
            backoff_initial_secs: cfg.stream.backoff_initial_secs,
            backoff_max_secs: cfg.stream.backoff_max_secs,
            max_reconnect_attempts: cfg.stream.max_reconnect_attempts,
        })
    }
}

/// Shard lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    Connecting,
    Streaming,
    Backoff,
    Failed,
    Stopped,
}

/// One running shard task
pub struct ShardHandle {
    pub id: usize,
    pub addresses: Vec<String>,
    pub state: Arc<StdRwLock<ShardState>>,
    pub stop: Arc<Notify>,
    pub task: tokio::task::JoinHandle<()>,
}

impl ShardHandle {
    pub fn state(&self) -> ShardState {
        *self.state.read().unwrap()
    }

    /// Best-effort stop: signal the task, then abort it
    pub fn shut_down(&self) {
        self.stop.notify_waiters();
        self.task.abort();
    }
}

/// Spawn a shard task for an address slice
pub fn spawn_shard(
    id: usize,
    addresses: Vec<String>,
    config: ShardConfig,
    sender: mpsc::Sender<TxPayload>,
) -> ShardHandle {
    let state = Arc::new(StdRwLock::new(ShardState::Connecting));
    let stop = Arc::new(Notify::new());

    let task_state = state.clone();
    let task_stop = stop.clone();
    let task_addresses = addresses.clone();

    let task = tokio::spawn(async move {
        run_shard(id, task_addresses, config, sender, task_state, task_stop).await;
    });

    ShardHandle {
        id,
        addresses,
        state,
        stop,
        task,
    }
}

/// Build the subscription filter for an address slice
fn build_request(addresses: &[String]) -> SubscribeRequest {
    let mut transactions: HashMap<String, SubscribeRequestFilterTransactions> = HashMap::new();
    transactions.insert(
        "watched_wallets".to_string(),
        SubscribeRequestFilterTransactions {
            vote: Some(false),
            failed: Some(false),
            signature: None,
            account_include: addresses.to_vec(),
            account_exclude: vec![],
            account_required: vec![],
        },
    );

    SubscribeRequest {
        transactions,
        commitment: Some(CommitmentLevel::Confirmed as i32),
        ..Default::default()
    }
}

fn set_state(state: &Arc<StdRwLock<ShardState>>, value: ShardState) {
    if let Ok(mut guard) = state.write() {
        *guard = value;
    }
}

/// Shard task body: connect, stream, back off, repeat
async fn run_shard(
    id: usize,
    addresses: Vec<String>,
    config: ShardConfig,
    sender: mpsc::Sender<TxPayload>,
    state: Arc<StdRwLock<ShardState>>,
    stop: Arc<Notify>,
) {
    let mut attempts: u32 = 0;
    let mut backoff = Duration::from_secs(config.backoff_initial_secs);
    let backoff_max = Duration::from_secs(config.backoff_max_secs);

    loop {
        set_state(&state, ShardState::Connecting);

        let connected = connect_and_stream(
            id,
            &addresses,
            &config,
            &sender,
            &state,
            &stop,
            &mut attempts,
            &mut backoff,
        )
        .await;

        match connected {
            StreamOutcome::Shutdown => {
                set_state(&state, ShardState::Stopped);
                return;
            }
            StreamOutcome::Retry => {
                attempts += 1;
                if attempts >= config.max_reconnect_attempts {
                    set_state(&state, ShardState::Failed);
                    logger::error(
                        LogTag::Stream,
                        &format!(
                            "Shard {} FAILED after {} attempts ({} addresses offline)",
                            id,
                            attempts,
                            addresses.len()
                        ),
                    );
                    return;
                }

                set_state(&state, ShardState::Backoff);
                logger::warning(
                    LogTag::Stream,
                    &format!(
                        "Shard {} reconnecting in {:.1}s (attempt {}/{})",
                        id,
                        backoff.as_secs_f64(),
                        attempts,
                        config.max_reconnect_attempts
                    ),
                );

                tokio::select! {
                    _ = stop.notified() => {
                        set_state(&state, ShardState::Stopped);
                        return;
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }

                backoff = std::cmp::min(backoff.mul_f64(1.5), backoff_max);
            }
        }
    }
}

enum StreamOutcome {
    /// Stop was requested
    Shutdown,
    /// Connection or stream failed; caller decides on backoff/FAILED
    Retry,
}

async fn connect_and_stream(
    id: usize,
    addresses: &[String],
    config: &ShardConfig,
    sender: &mpsc::Sender<TxPayload>,
    state: &Arc<StdRwLock<ShardState>>,
    stop: &Arc<Notify>,
    attempts: &mut u32,
    backoff: &mut Duration,
) -> StreamOutcome {
    let mut client = match build_client(config).await {
        Ok(client) => client,
        Err(e) => {
            logger::warning(LogTag::Stream, &e.to_string());
            return StreamOutcome::Retry;
        }
    };

    let mut stream = match client.subscribe_once(build_request(addresses)).await {
        Ok(stream) => stream,
        Err(e) => {
            let err = StreamError::SubscribeFailed {
                shard_id: id,
                reason: e.to_string(),
            };
            logger::warning(LogTag::Stream, &err.to_string());
            return StreamOutcome::Retry;
        }
    };

    set_state(state, ShardState::Streaming);
    logger::info(
        LogTag::Stream,
        &format!("Shard {} streaming ({} addresses)", id, addresses.len()),
    );

    loop {
        tokio::select! {
            _ = stop.notified() => {
                return StreamOutcome::Shutdown;
            }
            message = stream.next() => {
                match message {
                    Some(Ok(update)) => {
                        // Any successful message resets the failure budget
                        *attempts = 0;
                        *backoff = Duration::from_secs(config.backoff_initial_secs);

                        let created_at = update.created_at.as_ref().map(|t| t.seconds);

                        if let Some(UpdateOneof::Transaction(tx_update)) = update.update_oneof {
                            match decode_transaction_update(&tx_update, created_at) {
                                Ok(payload) => {
                                    // Dispatcher gone means shutdown is underway
                                    if sender.send(payload).await.is_err() {
                                        return StreamOutcome::Shutdown;
                                    }
                                }
                                Err(e) => {
                                    logger::debug(
                                        LogTag::Stream,
                                        &format!("Shard {} dropped malformed update: {}", id, e),
                                    );
                                }
                            }
                        }
                        // Pings and other update kinds need no handling
                    }
                    Some(Err(e)) => {
                        let err = StreamError::StreamBroken {
                            shard_id: id,
                            reason: e.to_string(),
                        };
                        logger::warning(LogTag::Stream, &err.to_string());
                        return StreamOutcome::Retry;
                    }
                    None => {
                        let err = StreamError::StreamClosed { shard_id: id };
                        logger::warning(LogTag::Stream, &err.to_string());
                        return StreamOutcome::Retry;
                    }
                }
            }
        }
    }
}

async fn build_client(
    config: &ShardConfig,
) -> Result<GeyserGrpcClient<impl Interceptor>, StreamError> {
    let connect_failed = |reason: String| StreamError::ConnectFailed {
        endpoint: config.endpoint.clone(),
        reason,
    };

    let mut builder = GeyserGrpcClient::build_from_shared(config.endpoint.clone())
        .map_err(|e| connect_failed(format!("bad endpoint: {}", e)))?
        .x_token(config.x_token.clone())
        .map_err(|e| connect_failed(format!("bad x-token: {}", e)))?
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .max_decoding_message_size(config.max_message_mib * 1024 * 1024)
        .max_encoding_message_size(config.max_message_mib * 1024 * 1024)
        .http2_keep_alive_interval(Duration::from_secs(config.keepalive_secs))
        .keep_alive_while_idle(true);

    if config.endpoint.starts_with("https://") {
        builder = builder
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .map_err(|e| connect_failed(format!("tls config: {}", e)))?;
    }

    builder
        .connect()
        .await
        .map_err(|e| connect_failed(e.to_string()))
}
