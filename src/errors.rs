/// Structured error types for the wallet activity pipeline
use std::fmt;

// =============================================================================
// STREAM ERROR TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub enum StreamError {
    ConnectFailed {
        endpoint: String,
        reason: String,
    },
    SubscribeFailed {
        shard_id: usize,
        reason: String,
    },
    StreamClosed {
        shard_id: usize,
    },
    StreamBroken {
        shard_id: usize,
        reason: String,
    },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::ConnectFailed { endpoint, reason } => {
                write!(f, "Failed to connect to {}: {}", endpoint, reason)
            }
            StreamError::SubscribeFailed { shard_id, reason } => {
                write!(f, "Shard {} failed to subscribe: {}", shard_id, reason)
            }
            StreamError::StreamClosed { shard_id } => {
                write!(f, "Shard {} stream ended", shard_id)
            }
            StreamError::StreamBroken { shard_id, reason } => {
                write!(f, "Shard {} stream error: {}", shard_id, reason)
            }
        }
    }
}

impl std::error::Error for StreamError {}

// =============================================================================
// RPC ERROR TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub enum RpcError {
    RequestFailed {
        method: String,
        reason: String,
    },
    AccountNotFound {
        address: String,
    },
    InvalidResponse {
        method: String,
        reason: String,
    },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::RequestFailed { method, reason } => {
                write!(f, "{} failed: {}", method, reason)
            }
            RpcError::AccountNotFound { address } => {
                write!(f, "Account not found: {}", address)
            }
            RpcError::InvalidResponse { method, reason } => {
                write!(f, "{} returned invalid response: {}", method, reason)
            }
        }
    }
}

impl std::error::Error for RpcError {}

// =============================================================================
// DECODE ERROR TYPES
// =============================================================================

#[derive(Debug, Clone)]
pub enum DecodeError {
    MissingField {
        field: &'static str,
    },
    BadSignature {
        reason: String,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingField { field } => write!(f, "Missing field: {}", field),
            DecodeError::BadSignature { reason } => write!(f, "Bad signature: {}", reason),
        }
    }
}

impl std::error::Error for DecodeError {}
