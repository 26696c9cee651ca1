//! Upstream transaction stream
//!
//! Sharded Yellowstone gRPC subscriptions over the watched wallet set:
//! - `decode` - strict payload normalisation (one shape downstream)
//! - `shard` - one long-lived subscription per address slice with a
//!   reconnect/backoff state machine
//! - `manager` - owns the shard set, serialises address-set mutations and
//!   holds the active group filter consulted by the dispatcher

pub mod decode;
pub mod manager;
pub mod shard;

pub use decode::{decode_transaction_update, normalize_signature, SignatureSource, TxPayload};
pub use manager::SubscriptionManager;
pub use shard::{ShardConfig, ShardState};
