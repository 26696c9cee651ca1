//! Database module for walletpulse
//!
//! SQLite persistence layer with separate concerns per file:
//! - Connection management and table initialization
//! - Wallet records and group membership
//! - Group lifecycle
//! - Token rows (metadata upserts preserving deployment time)
//! - Event persistence with signature-level idempotency
//!
//! ## Usage
//!
//! ```rust,ignore
//! use walletpulse::database::Database;
//!
//! let db = Database::new("data/walletpulse.db")?;
//! let wallet_id = db.upsert_wallet("SoMeAddReSS...", Some("whale-3"), None)?;
//! ```

pub mod connection;
pub mod groups;
pub mod models;
pub mod tokens;
pub mod transactions;
pub mod wallets;

// Re-export the main types for easier access
pub use connection::Database;
pub use models::{
    DatabaseResult, DatabaseStats, GroupRecord, PersistOutcome, StoredEvent, StoredOperation,
    TokenRow, WalletRecord,
};
