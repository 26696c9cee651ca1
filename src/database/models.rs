/// Row types and result aliases for the persistence layer
use serde::{Deserialize, Serialize};

/// Result alias used across the database layer
pub type DatabaseResult<T> = anyhow::Result<T>;

/// One watched wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: i64,
    pub address: String,
    pub name: Option<String>,
    pub group_id: Option<String>,
    pub group_name: Option<String>,
    pub is_active: bool,
}

/// Administrative wallet group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub created_by: Option<String>,
    pub created_at: String,
}

/// One token row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRow {
    pub id: i64,
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub deployment_time: Option<i64>,
}

/// Outcome of a persist attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// New row written; carries the transactions row id
    Inserted(i64),
    /// The (signature, wallet) pair already existed; nothing written
    Duplicate,
}

/// One stored event, shaped for the consumer bulk reload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: i64,
    pub signature: String,
    pub wallet_address: String,
    pub wallet_name: Option<String>,
    pub group_id: Option<String>,
    pub block_time: i64,
    pub transaction_type: String,
    pub sol_spent: f64,
    pub sol_received: f64,
    pub usd_spent: f64,
    pub usd_received: f64,
    pub operations: Vec<StoredOperation>,
}

/// One stored token operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredOperation {
    pub mint: String,
    pub symbol: String,
    pub name: String,
    pub amount: f64,
    pub operation_type: String,
}

/// Aggregate table counts for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub wallets: u64,
    pub active_wallets: u64,
    pub groups: u64,
    pub tokens: u64,
    pub transactions: u64,
    pub token_operations: u64,
}
