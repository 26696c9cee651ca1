/// SOL Price Service
///
/// Provides real-time SOL price data from Jupiter API for USD conversions in
/// the classifier. The service runs as a background task and maintains a
/// cached SOL price for the entire pipeline.
///
/// **Key Features:**
/// - Real-time SOL price fetching from Jupiter API
/// - Automatic price caching and refresh cycles
/// - Graceful shutdown handling
/// - Error resilience with anomaly rejection
/// - Thread-safe price access for concurrent operations
///
/// The classifier consumes a plain `f64` from `get_sol_price()`; a stale or
/// uninitialized cache reads as 0.0 and callers degrade accordingly.
use crate::config::with_config;
use crate::logger::{self, LogTag};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::time::interval;

// =============================================================================
// CONFIGURATION CONSTANTS
// =============================================================================

/// Jupiter API endpoint for SOL price
const JUPITER_PRICE_API: &str =
    "https://lite-api.jup.ag/price/v3?ids=So11111111111111111111111111111111111111112";

/// Maximum price change threshold for validation (50% change detection)
const MAX_PRICE_CHANGE_PERCENT: f64 = 50.0;

/// Maximum consecutive errors before marking cache as invalid
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

// =============================================================================
// DATA STRUCTURES
// =============================================================================

/// Jupiter API price response structure (direct mint address mapping)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JupiterPriceResponse {
    #[serde(rename = "So11111111111111111111111111111111111111112")]
    pub sol: JupiterTokenPrice,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct JupiterTokenPrice {
    #[serde(rename = "usdPrice")]
    pub usd_price: f64,
    #[serde(rename = "blockId")]
    pub block_id: u64,
    pub decimals: u8,
    #[serde(rename = "priceChange24h")]
    pub price_change_24h: f64,
}

/// Cached SOL price data with metadata
#[derive(Debug, Clone)]
pub struct SolPriceData {
    pub price_usd: f64,
    pub last_updated: Instant,
    pub is_valid: bool,
    pub fetch_count: u64,
    pub error_count: u64,
}

impl Default for SolPriceData {
    fn default() -> Self {
        Self {
            price_usd: 0.0,
            last_updated: Instant::now(),
            is_valid: false,
            fetch_count: 0,
            error_count: 0,
        }
    }
}

impl SolPriceData {
    /// Check if cached price is still inside the freshness window
    pub fn is_fresh(&self, window_secs: u64) -> bool {
        self.is_valid && self.last_updated.elapsed().as_secs() < window_secs
    }

    /// Get age of cached price in seconds
    pub fn age_seconds(&self) -> u64 {
        self.last_updated.elapsed().as_secs()
    }
}

// =============================================================================
// GLOBAL STATE
// =============================================================================

/// Global SOL price cache with thread-safe access
static SOL_PRICE_CACHE: Lazy<Arc<StdRwLock<SolPriceData>>> =
    Lazy::new(|| Arc::new(StdRwLock::new(SolPriceData::default())));

/// Service status tracking
static SERVICE_RUNNING: Lazy<Arc<std::sync::atomic::AtomicBool>> =
    Lazy::new(|| Arc::new(std::sync::atomic::AtomicBool::new(false)));

// =============================================================================
// PUBLIC API
// =============================================================================

/// Get current SOL price in USD
/// Returns cached price if available and fresh, otherwise returns 0.0
pub fn get_sol_price() -> f64 {
    let window = with_config(|cfg| cfg.sol_price.freshness_window_secs);
    match SOL_PRICE_CACHE.read() {
        Ok(cache) => {
            if cache.is_fresh(window) {
                cache.price_usd
            } else {
                logger::warning(
                    LogTag::SolPrice,
                    &format!(
                        "SOL price cache stale (age: {}s), returning 0.0",
                        cache.age_seconds()
                    ),
                );
                0.0
            }
        }
        Err(e) => {
            logger::error(
                LogTag::SolPrice,
                &format!("Failed to read SOL price cache: {}", e),
            );
            0.0
        }
    }
}

/// Get detailed SOL price information including metadata
pub fn get_sol_price_info() -> Option<SolPriceData> {
    SOL_PRICE_CACHE.read().ok().map(|cache| cache.clone())
}

/// Check if SOL price service is running
pub fn is_sol_price_service_running() -> bool {
    SERVICE_RUNNING.load(std::sync::atomic::Ordering::SeqCst)
}

// =============================================================================
// SERVICE LIFECYCLE
// =============================================================================

/// Start the SOL price service
///
/// Returns JoinHandle so the ServiceManager can wait for graceful shutdown.
pub async fn start_sol_price_service(
    shutdown: Arc<Notify>,
) -> Result<tokio::task::JoinHandle<()>, String> {
    logger::info(LogTag::SolPrice, "Starting SOL price service");

    SERVICE_RUNNING.store(true, std::sync::atomic::Ordering::SeqCst);

    let handle = tokio::spawn(async move {
        sol_price_task(shutdown).await;
    });

    Ok(handle)
}

/// Stop the SOL price service
pub async fn stop_sol_price_service() {
    SERVICE_RUNNING.store(false, std::sync::atomic::Ordering::SeqCst);
    logger::info(LogTag::SolPrice, "SOL price service stopped");
}

// =============================================================================
// BACKGROUND TASK
// =============================================================================

/// Main SOL price monitoring task
async fn sol_price_task(shutdown: Arc<Notify>) {
    logger::info(LogTag::SolPrice, "SOL price monitoring task started");

    let refresh_secs = with_config(|cfg| cfg.sol_price.refresh_interval_secs);
    let mut price_interval = interval(Duration::from_secs(refresh_secs));
    let mut consecutive_errors = 0u32;

    // Initial price fetch
    fetch_and_update_sol_price(&mut consecutive_errors).await;

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                logger::info(LogTag::SolPrice, "SOL price task shutdown requested");
                break;
            }
            _ = price_interval.tick() => {
                if !is_sol_price_service_running() {
                    break;
                }

                fetch_and_update_sol_price(&mut consecutive_errors).await;
            }
        }
    }

    SERVICE_RUNNING.store(false, std::sync::atomic::Ordering::SeqCst);
    logger::info(LogTag::SolPrice, "SOL price monitoring task completed");
}

// =============================================================================
// PRICE FETCHING LOGIC
// =============================================================================

/// Fetch SOL price from Jupiter API and update cache
async fn fetch_and_update_sol_price(consecutive_errors: &mut u32) {
    match fetch_sol_price_from_jupiter().await {
        Ok(price) => {
            if validate_price_change(price) {
                update_price_cache(price);
                *consecutive_errors = 0;
                logger::debug(
                    LogTag::SolPrice,
                    &format!("SOL price updated: ${:.4}", price),
                );
            } else {
                logger::warning(
                    LogTag::SolPrice,
                    &format!(
                        "SOL price validation failed: ${:.4} (change >{}%)",
                        price, MAX_PRICE_CHANGE_PERCENT
                    ),
                );
                *consecutive_errors += 1;
            }
        }
        Err(e) => {
            *consecutive_errors += 1;
            if let Ok(mut cache) = SOL_PRICE_CACHE.write() {
                cache.error_count += 1;
            }

            logger::error(
                LogTag::SolPrice,
                &format!(
                    "Failed to fetch SOL price: {} (errors: {})",
                    e, consecutive_errors
                ),
            );

            // Too many errors: mark cache invalid but keep last price visible in stats
            if *consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                if let Ok(mut cache) = SOL_PRICE_CACHE.write() {
                    cache.is_valid = false;
                }
            }
        }
    }
}

/// Fetch SOL price from Jupiter API
async fn fetch_sol_price_from_jupiter() -> Result<f64, String> {
    let timeout_secs = with_config(|cfg| cfg.sol_price.request_timeout_secs);
    let client = reqwest::Client::new();

    let response = client
        .get(JUPITER_PRICE_API)
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await
        .map_err(|e| format!("Request failed: {}", e))?;

    if !response.status().is_success() {
        return Err(format!("HTTP error: {}", response.status()));
    }

    let price_response: JupiterPriceResponse = response
        .json()
        .await
        .map_err(|e| format!("JSON parsing failed: {}", e))?;

    let sol_price = price_response.sol.usd_price;

    if sol_price > 0.0 && sol_price.is_finite() {
        Ok(sol_price)
    } else {
        Err(format!("Invalid SOL price: {}", sol_price))
    }
}

/// Validate price change to detect anomalies
fn validate_price_change(new_price: f64) -> bool {
    if new_price <= 0.0 || !new_price.is_finite() {
        return false;
    }

    if let Ok(cache) = SOL_PRICE_CACHE.read() {
        if cache.is_valid && cache.price_usd > 0.0 {
            let change_percent = ((new_price - cache.price_usd) / cache.price_usd).abs() * 100.0;
            if change_percent > MAX_PRICE_CHANGE_PERCENT {
                return false;
            }
        }
    }

    true
}

/// Update the price cache with new data
fn update_price_cache(price: f64) {
    if let Ok(mut cache) = SOL_PRICE_CACHE.write() {
        cache.price_usd = price;
        cache.last_updated = Instant::now();
        cache.is_valid = true;
        cache.fetch_count += 1;
    }
}

/// Get SOL price service statistics for debugging
pub fn get_sol_price_stats() -> String {
    match SOL_PRICE_CACHE.read() {
        Ok(cache) => {
            format!(
                "SOL Price Stats: ${:.4} | Age: {}s | Valid: {} | Fetches: {} | Errors: {} | Running: {}",
                cache.price_usd,
                cache.age_seconds(),
                cache.is_valid,
                cache.fetch_count,
                cache.error_count,
                is_sol_price_service_running()
            )
        }
        Err(_) => "SOL Price Stats: Cache lock error".to_string(),
    }
}
