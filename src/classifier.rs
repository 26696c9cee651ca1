/// Transaction Classifier
///
/// Pure function from a decoded transaction payload plus one watched wallet to
/// an optional buy/sell event. The classifier captures the *intent of the
/// watched wallet*, not the DEX route: stable-quoted trades are recognised
/// through the wallet's USDC balance movement first, and only then do raw SOL
/// balance deltas decide. The thresholds are asymmetric on purpose - a buy
/// must clear the fee floor before it counts, a sell only has to clear dust.
///
/// CPU-only: no I/O, no awaits. Symbol/name enrichment of the surviving token
/// changes happens in the dispatcher via the metadata resolver.
use crate::config::with_config;
use crate::constants::{LAMPORTS_PER_SOL, USDC_MINT, WSOL_MINT};
use crate::stream::decode::{TokenBalanceEntry, TxPayload};
use std::collections::HashMap;

// =============================================================================
// TYPES
// =============================================================================

/// Classification thresholds in SOL
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub buy_threshold_sol: f64,
    pub sell_threshold_sol: f64,
}

impl Thresholds {
    pub fn from_config() -> Self {
        with_config(|cfg| Self {
            buy_threshold_sol: cfg.classifier.buy_threshold_sol,
            sell_threshold_sol: cfg.classifier.sell_threshold_sol,
        })
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            buy_threshold_sol: 0.01,
            sell_threshold_sol: 0.001,
        }
    }
}

/// Direction of a classified event from the wallet's viewpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Buy,
    Sell,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Buy => "buy",
            EventType::Sell => "sell",
        }
    }
}

/// Aggregated per-mint token movement agreeing with the event direction
#[derive(Debug, Clone)]
pub struct TokenChange {
    pub mint: String,
    /// Magnitude of the raw delta in smallest units
    pub raw_amount: u128,
    pub decimals: u8,
    /// Magnitude in UI units (raw / 10^decimals)
    pub amount: f64,
    /// Filled by the metadata resolver before persist/publish
    pub symbol: String,
    pub name: String,
}

/// The classifier's output record
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    pub signature: String,
    pub block_time: i64,
    pub wallet_address: String,
    pub event_type: EventType,
    /// SOL value of the trade (converted from USDC for stable-quoted trades)
    pub sol_amount: f64,
    /// USD value at the classification-time SOL price
    pub usd_amount: f64,
    pub changes: Vec<TokenChange>,
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Classify one payload from one watched wallet's viewpoint.
///
/// Returns `None` for anything that is not a clean buy or sell: failed
/// transactions, wallets absent from the key list, movements below the
/// thresholds, and trades with no qualifying token delta.
pub fn classify(
    payload: &TxPayload,
    wallet_address: &str,
    sol_price: f64,
    thresholds: Thresholds,
) -> Option<ClassifiedEvent> {
    // Failed transactions never classify
    if payload.err.is_some() {
        return None;
    }
    if payload.pre_balances.is_empty() || payload.post_balances.is_empty() {
        return None;
    }

    // Wallet index over the expanded key list
    let wallet_index = payload
        .account_keys
        .iter()
        .position(|k| k == wallet_address)?;

    if wallet_index >= payload.pre_balances.len() || wallet_index >= payload.post_balances.len() {
        return None;
    }

    let sol_delta = (payload.post_balances[wallet_index] as i128
        - payload.pre_balances[wallet_index] as i128) as f64
        / LAMPORTS_PER_SOL;

    let usdc_delta = usdc_delta_ui(payload, wallet_address);

    // Decision ladder: USDC movement first, then raw SOL deltas.
    // A stale price (0.0) cannot convert USDC, so those trades fall through
    // to the SOL rules instead of dividing by zero.
    let (event_type, sol_amount) = if usdc_delta < 0.0 && sol_price > 0.0 {
        (EventType::Buy, usdc_delta.abs() / sol_price)
    } else if usdc_delta > 0.0 && sol_price > 0.0 {
        (EventType::Sell, usdc_delta / sol_price)
    } else if sol_delta < -thresholds.buy_threshold_sol {
        (EventType::Buy, sol_delta.abs())
    } else if sol_delta > thresholds.sell_threshold_sol {
        (EventType::Sell, sol_delta)
    } else {
        return None;
    };

    let changes = token_changes(payload, wallet_address, event_type);
    if changes.is_empty() {
        return None;
    }

    Some(ClassifiedEvent {
        signature: payload.signature.clone(),
        block_time: payload.block_time,
        wallet_address: wallet_address.to_string(),
        event_type,
        sol_amount,
        usd_amount: sol_amount * sol_price,
        changes,
    })
}

/// Net USDC movement of the wallet in UI units.
///
/// A missing pre or post entry counts as zero, which collapses the
/// "only post exists" / "only pre exists" cases into plain subtraction.
fn usdc_delta_ui(payload: &TxPayload, wallet_address: &str) -> f64 {
    let sum_side = |entries: &[TokenBalanceEntry]| -> (i128, u8) {
        let mut total: i128 = 0;
        let mut decimals = 6u8;
        for entry in entries {
            if entry.mint == USDC_MINT && entry.owner == wallet_address {
                total += entry.raw_amount;
                decimals = entry.decimals;
            }
        }
        (total, decimals)
    };

    let (pre_raw, pre_dec) = sum_side(&payload.pre_token_balances);
    let (post_raw, post_dec) = sum_side(&payload.post_token_balances);
    let decimals = if post_raw != 0 { post_dec } else { pre_dec };

    (post_raw - pre_raw) as f64 / 10f64.powi(decimals as i32)
}

/// Per-mint aggregated token deltas whose sign agrees with the event type.
///
/// Wrapped SOL and USDC are quote-side legs, never the traded token.
fn token_changes(
    payload: &TxPayload,
    wallet_address: &str,
    event_type: EventType,
) -> Vec<TokenChange> {
    // Collect per-account raw balances on each side, keyed by (mint, index)
    let mut pre: HashMap<(String, u32), &TokenBalanceEntry> = HashMap::new();
    for entry in &payload.pre_token_balances {
        if entry.owner == wallet_address {
            pre.insert((entry.mint.clone(), entry.account_index), entry);
        }
    }
    let mut post: HashMap<(String, u32), &TokenBalanceEntry> = HashMap::new();
    for entry in &payload.post_token_balances {
        if entry.owner == wallet_address {
            post.insert((entry.mint.clone(), entry.account_index), entry);
        }
    }

    let mut keys: Vec<(String, u32)> = pre.keys().cloned().collect();
    for key in post.keys() {
        if !pre.contains_key(key) {
            keys.push(key.clone());
        }
    }

    // Aggregate agreeing deltas by mint
    let mut aggregated: HashMap<String, (u128, u8)> = HashMap::new();
    for key in keys {
        let (mint, _) = &key;
        if mint == WSOL_MINT || mint == USDC_MINT {
            continue;
        }

        let pre_entry = pre.get(&key);
        let post_entry = post.get(&key);

        let pre_raw = pre_entry.map(|e| e.raw_amount).unwrap_or(0);
        let post_raw = post_entry.map(|e| e.raw_amount).unwrap_or(0);
        let decimals = post_entry.or(pre_entry).map(|e| e.decimals).unwrap_or(0);

        let delta = post_raw - pre_raw;

        let agrees = match event_type {
            EventType::Buy => delta > 0,
            EventType::Sell => delta < 0,
        };
        if !agrees {
            continue;
        }

        let slot = aggregated.entry(mint.clone()).or_insert((0u128, decimals));
        slot.0 += delta.unsigned_abs();
        slot.1 = decimals;
    }

    let mut changes: Vec<TokenChange> = aggregated
        .into_iter()
        .map(|(mint, (raw_amount, decimals))| TokenChange {
            mint,
            raw_amount,
            decimals,
            amount: raw_amount as f64 / 10f64.powi(decimals as i32),
            symbol: String::new(),
            name: String::new(),
        })
        .collect();

    // Deterministic order for downstream persistence and tests
    changes.sort_by(|a, b| a.mint.cmp(&b.mint));
    changes
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::decode::{TokenBalanceEntry, TxPayload};

    const W1: &str = "Wa11etAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const OTHER: &str = "othEraaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const M1: &str = "M1ntAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
    const M2: &str = "M2ntBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB";

    fn payload(pre: Vec<u64>, post: Vec<u64>) -> TxPayload {
        TxPayload {
            signature: "sig".to_string(),
            slot: 1,
            block_time: 1_700_000_000,
            account_keys: vec![W1.to_string(), OTHER.to_string()],
            fee: 5000,
            err: None,
            pre_balances: pre,
            post_balances: post,
            pre_token_balances: vec![],
            post_token_balances: vec![],
        }
    }

    fn token(account_index: u32, mint: &str, owner: &str, raw: i128, decimals: u8) -> TokenBalanceEntry {
        TokenBalanceEntry {
            account_index,
            mint: mint.to_string(),
            owner: owner.to_string(),
            raw_amount: raw,
            decimals,
        }
    }

    #[test]
    fn sol_quoted_buy() {
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.pre_token_balances = vec![token(2, M1, W1, 0, 6)];
        p.post_token_balances = vec![token(2, M1, W1, 1_000_000, 6)];

        let event = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert_eq!(event.event_type, EventType::Buy);
        assert!((event.sol_amount - 0.5).abs() < 1e-9);
        assert_eq!(event.changes.len(), 1);
        assert_eq!(event.changes[0].mint, M1);
        assert_eq!(event.changes[0].raw_amount, 1_000_000);
        assert!((event.changes[0].amount - 1.0).abs() < 1e-9);
    }

    #[test]
    fn usdc_quoted_sell_overrides_sol_dust() {
        // +0.00005 SOL is below the sell threshold; the USDC inflow decides
        let mut p = payload(vec![1_000_000_000, 0], vec![1_000_050_000, 0]);
        p.pre_token_balances = vec![
            token(2, USDC_MINT, W1, 0, 6),
            token(3, M2, W1, 500_000_000_000, 9),
        ];
        p.post_token_balances = vec![
            token(2, USDC_MINT, W1, 12_000_000, 6),
            token(3, M2, W1, 0, 9),
        ];

        let event = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert_eq!(event.event_type, EventType::Sell);
        assert!((event.sol_amount - 12.0 / 150.0).abs() < 1e-9);
        assert_eq!(event.changes.len(), 1);
        assert_eq!(event.changes[0].mint, M2);
        assert_eq!(event.changes[0].raw_amount, 500_000_000_000);
    }

    #[test]
    fn usdc_outflow_classifies_buy() {
        let mut p = payload(vec![1_000_000_000, 0], vec![999_000_000, 0]);
        p.pre_token_balances = vec![token(2, USDC_MINT, W1, 30_000_000, 6)];
        p.post_token_balances = vec![token(3, M1, W1, 2_500_000, 6)];

        let event = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert_eq!(event.event_type, EventType::Buy);
        assert!((event.sol_amount - 30.0 / 150.0).abs() < 1e-9);
    }

    #[test]
    fn dust_transfer_ignored() {
        // -0.002 SOL: above the sell dust floor in magnitude, but it's an
        // outflow and below the buy fee floor
        let p = payload(vec![1_000_000_000, 0], vec![998_000_000, 0]);
        assert!(classify(&p, W1, 150.0, Thresholds::default()).is_none());
    }

    #[test]
    fn failed_transaction_skipped() {
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.err = Some("InstructionError".to_string());
        p.post_token_balances = vec![token(2, M1, W1, 1_000_000, 6)];
        assert!(classify(&p, W1, 150.0, Thresholds::default()).is_none());
    }

    #[test]
    fn unwatched_wallet_skipped() {
        let p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        assert!(classify(&p, "unknownWa11et", 150.0, Thresholds::default()).is_none());
    }

    #[test]
    fn no_qualifying_token_delta_skipped() {
        // Clear SOL outflow but the only token movement is the wrong sign
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.pre_token_balances = vec![token(2, M1, W1, 1_000_000, 6)];
        p.post_token_balances = vec![token(2, M1, W1, 0, 6)];
        assert!(classify(&p, W1, 150.0, Thresholds::default()).is_none());
    }

    #[test]
    fn wsol_and_usdc_never_count_as_token_changes() {
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.pre_token_balances = vec![token(2, WSOL_MINT, W1, 0, 9)];
        p.post_token_balances = vec![
            token(2, WSOL_MINT, W1, 400_000_000, 9),
            token(3, M1, W1, 1_000_000, 6),
        ];

        let event = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert_eq!(event.changes.len(), 1);
        assert_eq!(event.changes[0].mint, M1);
    }

    #[test]
    fn multiple_accounts_same_mint_aggregate() {
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.post_token_balances = vec![
            token(2, M1, W1, 600_000, 6),
            token(5, M1, W1, 400_000, 6),
        ];

        let event = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert_eq!(event.changes.len(), 1);
        assert_eq!(event.changes[0].raw_amount, 1_000_000);
    }

    #[test]
    fn other_owners_balances_ignored() {
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.post_token_balances = vec![
            token(2, M1, OTHER, 9_000_000, 6),
            token(3, M1, W1, 1_000_000, 6),
        ];

        let event = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert_eq!(event.changes[0].raw_amount, 1_000_000);
    }

    #[test]
    fn classification_is_deterministic() {
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.post_token_balances = vec![
            token(2, M1, W1, 1_000_000, 6),
            token(3, M2, W1, 2_000_000_000, 9),
        ];

        let a = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        let b = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert_eq!(a.event_type, b.event_type);
        assert_eq!(a.sol_amount, b.sol_amount);
        assert_eq!(a.changes.len(), b.changes.len());
        for (x, y) in a.changes.iter().zip(b.changes.iter()) {
            assert_eq!(x.mint, y.mint);
            assert_eq!(x.raw_amount, y.raw_amount);
        }
    }

    #[test]
    fn sign_consistency_holds() {
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.post_token_balances = vec![token(2, M1, W1, 1_000_000, 6)];

        let event = classify(&p, W1, 150.0, Thresholds::default()).unwrap();
        assert!(event.sol_amount > 0.0);
        for change in &event.changes {
            assert!(change.raw_amount > 0);
            assert!(change.amount > 0.0);
        }
    }

    #[test]
    fn stale_price_falls_back_to_sol_rules() {
        // USDC moved, but with no price the SOL delta decides
        let mut p = payload(vec![1_000_000_000, 0], vec![500_000_000, 0]);
        p.pre_token_balances = vec![token(2, USDC_MINT, W1, 12_000_000, 6)];
        p.post_token_balances = vec![token(3, M1, W1, 1_000_000, 6)];

        let event = classify(&p, W1, 0.0, Thresholds::default()).unwrap();
        assert_eq!(event.event_type, EventType::Buy);
        assert!((event.sol_amount - 0.5).abs() < 1e-9);
        assert_eq!(event.usd_amount, 0.0);
    }

    #[test]
    fn custom_thresholds_respected() {
        let p = payload(vec![1_000_000_000, 0], vec![996_000_000, 0]);
        // -0.004 SOL: below default buy floor
        assert!(classify(&p, W1, 150.0, Thresholds::default()).is_none());

        // With a lower floor it classifies, provided a token delta exists
        let mut p2 = p.clone();
        p2.post_token_balances = vec![TokenBalanceEntry {
            account_index: 2,
            mint: M1.to_string(),
            owner: W1.to_string(),
            raw_amount: 1_000,
            decimals: 6,
        }];
        let thresholds = Thresholds {
            buy_threshold_sol: 0.001,
            sell_threshold_sol: 0.001,
        };
        let event = classify(&p2, W1, 150.0, thresholds).unwrap();
        assert_eq!(event.event_type, EventType::Buy);
    }
}
