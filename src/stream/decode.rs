/// Strict decode of upstream transaction updates
///
/// The Yellowstone update is a deeply nested protobuf with optional fields and
/// byte-array keys. Everything downstream of this module sees exactly one
/// shape: `TxPayload`, with base58 account keys (static keys followed by the
/// lookup-table loaded writable and readonly addresses, each folded in once)
/// and one canonical base58 signature.
use crate::constants::{SIGNATURE_B58_MAX_LEN, SIGNATURE_B58_MIN_LEN, SIGNATURE_BYTE_LEN};
use crate::errors::DecodeError;
use yellowstone_grpc_proto::prelude::SubscribeUpdateTransaction;

/// One pre/post token balance entry, owner-attributed
#[derive(Debug, Clone)]
pub struct TokenBalanceEntry {
    pub account_index: u32,
    pub mint: String,
    pub owner: String,
    /// Raw amount in smallest units, parsed from the decimal string
    pub raw_amount: i128,
    pub decimals: u8,
}

/// Normalised transaction payload consumed by the classifier
#[derive(Debug, Clone)]
pub struct TxPayload {
    /// Canonical base58 signature
    pub signature: String,
    pub slot: u64,
    /// Unix seconds; upstream arrival time when the update carries none
    pub block_time: i64,
    /// Expanded account key list: static, loaded writable, loaded readonly
    pub account_keys: Vec<String>,
    pub fee: u64,
    /// Present iff the transaction failed
    pub err: Option<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalanceEntry>,
    pub post_token_balances: Vec<TokenBalanceEntry>,
}

/// A signature as it may arrive from upstream
pub enum SignatureSource<'a> {
    /// Raw 64-byte ed25519 signature
    Raw(&'a [u8]),
    /// Already base58-encoded text
    Base58(&'a str),
}

/// Normalise any accepted signature encoding to its canonical base58 form.
///
/// The result is always the base58 encoding of the 64 raw bytes; text input
/// is decoded and re-encoded so every representation of the same signature
/// yields an identical string. Out-of-range results are rejected.
pub fn normalize_signature(source: SignatureSource) -> Result<String, DecodeError> {
    let bytes: Vec<u8> = match source {
        SignatureSource::Raw(bytes) => bytes.to_vec(),
        SignatureSource::Base58(text) => {
            bs58::decode(text.trim())
                .into_vec()
                .map_err(|e| DecodeError::BadSignature {
                    reason: format!("not base58: {}", e),
                })?
        }
    };

    if bytes.len() != SIGNATURE_BYTE_LEN {
        return Err(DecodeError::BadSignature {
            reason: format!("expected {} bytes, got {}", SIGNATURE_BYTE_LEN, bytes.len()),
        });
    }

    let encoded = bs58::encode(&bytes).into_string();

    if encoded.len() < SIGNATURE_B58_MIN_LEN || encoded.len() > SIGNATURE_B58_MAX_LEN {
        return Err(DecodeError::BadSignature {
            reason: format!("encoded length {} out of range", encoded.len()),
        });
    }

    Ok(encoded)
}

/// Decode one transaction update into a `TxPayload`.
///
/// `created_at` is the update's server timestamp when present; confirmed
/// transaction updates carry no block time of their own, so arrival time is
/// the closest observable stand-in.
pub fn decode_transaction_update(
    update: &SubscribeUpdateTransaction,
    created_at: Option<i64>,
) -> Result<TxPayload, DecodeError> {
    let info = update
        .transaction
        .as_ref()
        .ok_or(DecodeError::MissingField {
            field: "transaction",
        })?;

    let meta = info.meta.as_ref().ok_or(DecodeError::MissingField { field: "meta" })?;

    let tx = info
        .transaction
        .as_ref()
        .ok_or(DecodeError::MissingField {
            field: "transaction.transaction",
        })?;

    let message = tx.message.as_ref().ok_or(DecodeError::MissingField {
        field: "transaction.message",
    })?;

    // Signature: prefer the top-level field, fall back to signatures[0]
    let signature = if !info.signature.is_empty() {
        normalize_signature(SignatureSource::Raw(&info.signature))?
    } else if let Some(first) = tx.signatures.first() {
        normalize_signature(SignatureSource::Raw(first))?
    } else {
        return Err(DecodeError::MissingField { field: "signature" });
    };

    // Expanded key list: static keys, then lookup-table loaded addresses in
    // the order Solana assigns balance indexes (writable before readonly)
    let mut account_keys: Vec<String> = Vec::with_capacity(
        message.account_keys.len()
            + meta.loaded_writable_addresses.len()
            + meta.loaded_readonly_addresses.len(),
    );
    for key in &message.account_keys {
        account_keys.push(bs58::encode(key).into_string());
    }
    for key in &meta.loaded_writable_addresses {
        account_keys.push(bs58::encode(key).into_string());
    }
    for key in &meta.loaded_readonly_addresses {
        account_keys.push(bs58::encode(key).into_string());
    }

    let err = meta.err.as_ref().map(|e| format!("{:?}", e.err));

    let block_time = created_at.unwrap_or_else(|| chrono::Utc::now().timestamp());

    Ok(TxPayload {
        signature,
        slot: update.slot,
        block_time,
        account_keys,
        fee: meta.fee,
        err,
        pre_balances: meta.pre_balances.clone(),
        post_balances: meta.post_balances.clone(),
        pre_token_balances: decode_token_balances(&meta.pre_token_balances),
        post_token_balances: decode_token_balances(&meta.post_token_balances),
    })
}

fn decode_token_balances(
    balances: &[yellowstone_grpc_proto::prelude::TokenBalance],
) -> Vec<TokenBalanceEntry> {
    balances
        .iter()
        .filter_map(|b| {
            let ui = b.ui_token_amount.as_ref()?;
            let raw_amount: i128 = ui.amount.parse().ok()?;
            Some(TokenBalanceEntry {
                account_index: b.account_index,
                mint: b.mint.clone(),
                owner: b.owner.clone(),
                raw_amount,
                decimals: ui.decimals as u8,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_encodings_normalize_identically() {
        let raw: Vec<u8> = (0u8..64).collect();
        let text = bs58::encode(&raw).into_string();

        let from_raw = normalize_signature(SignatureSource::Raw(&raw)).unwrap();
        let from_text = normalize_signature(SignatureSource::Base58(&text)).unwrap();
        // signatures[0] arrives as the same raw bytes through a second path
        let from_nested = normalize_signature(SignatureSource::Raw(raw.as_slice())).unwrap();

        assert_eq!(from_raw, from_text);
        assert_eq!(from_raw, from_nested);
        assert!(from_raw.len() >= SIGNATURE_B58_MIN_LEN);
        assert!(from_raw.len() <= SIGNATURE_B58_MAX_LEN);
    }

    #[test]
    fn short_signature_rejected() {
        let raw = [7u8; 32];
        assert!(normalize_signature(SignatureSource::Raw(&raw)).is_err());
    }

    #[test]
    fn garbage_text_rejected() {
        assert!(normalize_signature(SignatureSource::Base58("not!base58")).is_err());
        assert!(normalize_signature(SignatureSource::Base58("abc")).is_err());
    }

    #[test]
    fn whitespace_tolerated_in_text() {
        let raw = [42u8; 64];
        let text = format!("  {}  ", bs58::encode(&raw).into_string());
        let normalized = normalize_signature(SignatureSource::Base58(&text)).unwrap();
        assert_eq!(normalized, bs58::encode(&raw).into_string());
    }
}
