/// End-to-end pipeline scenarios over an in-memory store
///
/// These drive `process_message` directly - the same function every flush
/// worker runs - with a quiet subscription manager, so classification,
/// deduplication, persistence and fanout are exercised together without a
/// live upstream.
use std::sync::Arc;
use tokio::sync::mpsc;

use walletpulse::database::Database;
use walletpulse::dedup::SignatureDedup;
use walletpulse::dispatcher::{process_message, DispatcherContext};
use walletpulse::fanout::{FanoutBus, PublishedEvent};
use walletpulse::metadata::{TokenMeta, TokenMetadataResolver};
use walletpulse::rpc::ChainRpc;
use walletpulse::stream::decode::{TokenBalanceEntry, TxPayload};
use walletpulse::stream::SubscriptionManager;

const W1: &str = "WaLLet1111111111111111111111111111111111111";
const W2: &str = "WaLLet2222222222222222222222222222222222222";
const M1: &str = "MintM1111111111111111111111111111111111111";

fn init_config() {
    // Defaults are fine; tolerate repeat initialization across tests
    let _ = walletpulse::config::load_config_from_path("does-not-exist.toml");
}

struct Harness {
    db: Arc<Database>,
    fanout: Arc<FanoutBus>,
    manager: Arc<SubscriptionManager>,
    ctx: Arc<DispatcherContext>,
}

async fn harness(watched: &[&str]) -> Harness {
    init_config();

    let db = Arc::new(Database::in_memory().unwrap());
    let fanout = Arc::new(FanoutBus::new());
    // Never contacted: every mint used by the tests is primed below
    let rpc = Arc::new(ChainRpc::new("http://127.0.0.1:1", 1));
    let resolver = Arc::new(TokenMetadataResolver::new(rpc, db.clone()));
    resolver.prime(TokenMeta {
        mint: M1.to_string(),
        symbol: "TST".to_string(),
        name: "Test Token".to_string(),
        decimals: 6,
        deployment_time: Some(1_690_000_000),
    });

    let dedup = Arc::new(SignatureDedup::new(5000, 50000));

    let (tx, _rx) = mpsc::channel(16);
    let manager = Arc::new(SubscriptionManager::new(tx));
    manager
        .replace_address_set(watched.iter().map(|s| s.to_string()).collect())
        .await
        .unwrap();

    let mut ctx = DispatcherContext::new(
        db.clone(),
        dedup,
        fanout.clone(),
        resolver,
        manager.clone(),
    );
    // Deterministic price for USD conversion
    ctx.sol_price_source = || 150.0;

    Harness {
        db,
        fanout,
        manager,
        ctx: Arc::new(ctx),
    }
}

/// SOL-quoted buy: 0.5 SOL out, 1.0 M1 in
fn buy_payload(signature: &str, wallet: &str) -> TxPayload {
    TxPayload {
        signature: signature.to_string(),
        slot: 100,
        block_time: 1_700_000_000,
        account_keys: vec![wallet.to_string(), "someProgram".to_string()],
        fee: 5000,
        err: None,
        pre_balances: vec![1_000_000_000, 0],
        post_balances: vec![500_000_000, 0],
        pre_token_balances: vec![TokenBalanceEntry {
            account_index: 2,
            mint: M1.to_string(),
            owner: wallet.to_string(),
            raw_amount: 0,
            decimals: 6,
        }],
        post_token_balances: vec![TokenBalanceEntry {
            account_index: 2,
            mint: M1.to_string(),
            owner: wallet.to_string(),
            raw_amount: 1_000_000,
            decimals: 6,
        }],
    }
}

#[tokio::test]
async fn classified_buy_is_persisted_and_published() {
    let h = harness(&[W1]).await;
    h.db.upsert_wallet(W1, Some("whale"), None).unwrap();

    let mut rx = h.fanout.subscribe();

    process_message(h.ctx.clone(), buy_payload("sig1", W1)).await;

    // One database row with the classified amounts
    let events = h.db.recent_events(10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].transaction_type, "buy");
    assert!((events[0].sol_spent - 0.5).abs() < 1e-9);
    assert_eq!(events[0].sol_received, 0.0);
    assert!((events[0].usd_spent - 75.0).abs() < 1e-6);
    assert_eq!(events[0].operations.len(), 1);
    assert_eq!(events[0].operations[0].symbol, "TST");

    // One fanout message with enriched token metadata
    let raw = rx.recv().await.unwrap();
    let published: PublishedEvent = serde_json::from_str(&raw).unwrap();
    assert_eq!(published.signature, "sig1");
    assert_eq!(published.transaction_type, "buy");
    assert_eq!(published.wallet_name.as_deref(), Some("whale"));
    assert_eq!(published.tokens.len(), 1);
    assert_eq!(published.tokens[0].symbol, "TST");
    assert!((published.tokens[0].amount - 1.0).abs() < 1e-9);

    let stats = h.ctx.counters.snapshot();
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.published, 1);
}

#[tokio::test]
async fn duplicate_replay_writes_once_and_publishes_once() {
    let h = harness(&[W1]).await;
    h.db.upsert_wallet(W1, None, None).unwrap();

    let mut rx = h.fanout.subscribe();

    // Same payload delivered twice inside the window
    process_message(h.ctx.clone(), buy_payload("sig1", W1)).await;
    process_message(h.ctx.clone(), buy_payload("sig1", W1)).await;

    assert_eq!(h.db.stats().unwrap().transactions, 1);

    assert!(rx.recv().await.is_ok());
    assert!(rx.try_recv().is_err(), "second publish must not happen");

    let stats = h.ctx.counters.snapshot();
    assert_eq!(stats.persisted, 1);
    assert_eq!(stats.duplicates, 1);
}

#[tokio::test]
async fn replay_after_hot_set_loss_is_caught_by_the_store() {
    let h = harness(&[W1]).await;
    h.db.upsert_wallet(W1, None, None).unwrap();

    process_message(h.ctx.clone(), buy_payload("sig1", W1)).await;
    assert_eq!(h.db.stats().unwrap().transactions, 1);

    // A fresh context simulates a process whose hot set forgot the signature
    let rpc = Arc::new(ChainRpc::new("http://127.0.0.1:1", 1));
    let resolver = Arc::new(TokenMetadataResolver::new(rpc, h.db.clone()));
    resolver.prime(TokenMeta {
        mint: M1.to_string(),
        symbol: "TST".to_string(),
        name: "Test Token".to_string(),
        decimals: 6,
        deployment_time: None,
    });
    let mut fresh = DispatcherContext::new(
        h.db.clone(),
        Arc::new(SignatureDedup::new(5000, 50000)),
        h.fanout.clone(),
        resolver,
        h.manager.clone(),
    );
    fresh.sol_price_source = || 150.0;
    let fresh = Arc::new(fresh);

    let mut rx = h.fanout.subscribe();
    process_message(fresh.clone(), buy_payload("sig1", W1)).await;

    // Unique constraint suppressed it: no new row, no publish
    assert_eq!(h.db.stats().unwrap().transactions, 1);
    assert!(rx.try_recv().is_err());
    assert_eq!(fresh.counters.snapshot().duplicates, 1);
}

#[tokio::test]
async fn unknown_wallet_payload_is_dropped() {
    let h = harness(&[W1]).await;
    h.db.upsert_wallet(W1, None, None).unwrap();

    process_message(h.ctx.clone(), buy_payload("sig1", W2)).await;

    assert_eq!(h.db.stats().unwrap().transactions, 0);
    assert_eq!(h.ctx.counters.snapshot().unknown_wallet, 1);
}

#[tokio::test]
async fn group_filter_drops_foreign_groups() {
    let h = harness(&[W1, W2]).await;

    let group_a = h.db.create_group("alpha", None).unwrap();
    let group_b = h.db.create_group("beta", None).unwrap();
    h.db.upsert_wallet(W1, None, Some(&group_a.id)).unwrap();
    h.db.upsert_wallet(W2, None, Some(&group_b.id)).unwrap();

    h.manager.switch_group(Some(group_b.id.clone()));

    let mut global_rx = h.fanout.subscribe();
    let mut group_rx = h.fanout.subscribe_group(&group_b.id);

    // One transaction touching both watched wallets: W1 buys, W2 sells
    let payload = TxPayload {
        signature: "sig-both".to_string(),
        slot: 100,
        block_time: 1_700_000_000,
        account_keys: vec![W1.to_string(), W2.to_string()],
        fee: 5000,
        err: None,
        pre_balances: vec![1_000_000_000, 1_000_000_000],
        post_balances: vec![500_000_000, 1_300_000_000],
        pre_token_balances: vec![TokenBalanceEntry {
            account_index: 3,
            mint: M1.to_string(),
            owner: W2.to_string(),
            raw_amount: 2_000_000,
            decimals: 6,
        }],
        post_token_balances: vec![
            TokenBalanceEntry {
                account_index: 2,
                mint: M1.to_string(),
                owner: W1.to_string(),
                raw_amount: 1_000_000,
                decimals: 6,
            },
            TokenBalanceEntry {
                account_index: 3,
                mint: M1.to_string(),
                owner: W2.to_string(),
                raw_amount: 0,
                decimals: 6,
            },
        ],
    };

    process_message(h.ctx.clone(), payload).await;

    // Only W2 (group B) got through the filter
    let events = h.db.recent_events(10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].wallet_address, W2);
    assert_eq!(events[0].transaction_type, "sell");

    let global_msg: PublishedEvent =
        serde_json::from_str(&global_rx.recv().await.unwrap()).unwrap();
    assert_eq!(global_msg.wallet_address, W2);
    assert_eq!(global_msg.group_id.as_deref(), Some(group_b.id.as_str()));

    let group_msg: PublishedEvent =
        serde_json::from_str(&group_rx.recv().await.unwrap()).unwrap();
    assert_eq!(group_msg.signature, "sig-both");

    let stats = h.ctx.counters.snapshot();
    assert_eq!(stats.group_filtered, 1);
    assert_eq!(stats.persisted, 1);
}

#[tokio::test]
async fn clearing_group_filter_restores_all_wallets() {
    let h = harness(&[W1]).await;
    let group_a = h.db.create_group("alpha", None).unwrap();
    h.db.upsert_wallet(W1, None, Some(&group_a.id)).unwrap();

    h.manager.switch_group(Some("some-other-group".to_string()));
    process_message(h.ctx.clone(), buy_payload("sig1", W1)).await;
    assert_eq!(h.db.stats().unwrap().transactions, 0);

    h.manager.switch_group(None);
    process_message(h.ctx.clone(), buy_payload("sig2", W1)).await;
    assert_eq!(h.db.stats().unwrap().transactions, 1);
}

#[tokio::test]
async fn failed_transaction_never_persists() {
    let h = harness(&[W1]).await;
    h.db.upsert_wallet(W1, None, None).unwrap();

    let mut payload = buy_payload("sig1", W1);
    payload.err = Some("InstructionError".to_string());

    process_message(h.ctx.clone(), payload).await;

    assert_eq!(h.db.stats().unwrap().transactions, 0);
    assert_eq!(h.ctx.counters.snapshot().below_threshold, 1);
}

#[tokio::test]
async fn deactivated_wallet_is_ignored() {
    let h = harness(&[W1]).await;
    h.db.upsert_wallet(W1, None, None).unwrap();
    h.db.deactivate_wallet(W1).unwrap();

    process_message(h.ctx.clone(), buy_payload("sig1", W1)).await;

    assert_eq!(h.db.stats().unwrap().transactions, 0);
}

#[tokio::test]
async fn bulk_reload_matches_published_history() {
    let h = harness(&[W1]).await;
    h.db.upsert_wallet(W1, None, None).unwrap();

    process_message(h.ctx.clone(), buy_payload("sig1", W1)).await;
    process_message(h.ctx.clone(), buy_payload("sig2", W1)).await;

    // A reconnecting consumer reloads from the store, newest first
    let events = h.db.recent_events(10).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].signature, "sig2");
    assert_eq!(events[1].signature, "sig1");
    assert!(events.iter().all(|e| e.transaction_type == "buy"));
}
