/// Blockchain RPC access for the metadata resolver
///
/// Thin wrapper over the nonblocking Solana RPC client exposing exactly the
/// calls the pipeline needs: mint account reads (decimals), Metaplex metadata
/// reads (symbol/name), signature history paging and single-transaction
/// lookups for first-deployment discovery.
///
/// All calls inherit the configured request timeout and run at *confirmed*
/// commitment, matching the upstream subscription.
use crate::errors::RpcError;
use crate::logger::{self, LogTag};
use mpl_token_metadata::accounts::Metadata;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_program::program_pack::Pack;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::UiTransactionEncoding;
use spl_token::state::Mint;
use std::str::FromStr;
use std::time::Duration;

/// One entry from getSignaturesForAddress
#[derive(Debug, Clone)]
pub struct SignatureRecord {
    pub signature: String,
    pub block_time: Option<i64>,
}

/// RPC client for on-chain lookups
pub struct ChainRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
    timeout_secs: u64,
}

impl ChainRpc {
    pub fn new(url: &str, timeout_secs: u64) -> Self {
        let commitment = CommitmentConfig::confirmed();
        let client = RpcClient::new_with_timeout_and_commitment(
            url.to_string(),
            Duration::from_secs(timeout_secs),
            commitment,
        );

        Self {
            client,
            commitment,
            timeout_secs,
        }
    }

    fn parse_pubkey(&self, address: &str) -> Result<Pubkey, RpcError> {
        Pubkey::from_str(address).map_err(|e| RpcError::InvalidResponse {
            method: "parse_pubkey".to_string(),
            reason: format!("invalid address {}: {}", address, e),
        })
    }

    /// Read the decimals field from a mint account.
    ///
    /// Only the base SPL mint layout is unpacked, so token-2022 mints with
    /// extension data parse the same as classic mints.
    pub async fn get_mint_decimals(&self, mint: &str) -> Result<u8, RpcError> {
        let pubkey = self.parse_pubkey(mint)?;

        let response = self
            .client
            .get_account_with_commitment(&pubkey, self.commitment)
            .await
            .map_err(|e| RpcError::RequestFailed {
                method: "getAccountInfo".to_string(),
                reason: e.to_string(),
            })?;

        let account = response.value.ok_or_else(|| RpcError::AccountNotFound {
            address: mint.to_string(),
        })?;

        if account.data.len() < Mint::LEN {
            return Err(RpcError::InvalidResponse {
                method: "getAccountInfo".to_string(),
                reason: format!(
                    "mint account {} too short: {} bytes",
                    mint,
                    account.data.len()
                ),
            });
        }

        let mint_state =
            Mint::unpack_from_slice(&account.data[..Mint::LEN]).map_err(|e| {
                RpcError::InvalidResponse {
                    method: "getAccountInfo".to_string(),
                    reason: format!("failed to unpack mint {}: {}", mint, e),
                }
            })?;

        Ok(mint_state.decimals)
    }

    /// Read symbol/name from the Metaplex metadata PDA, if it exists.
    ///
    /// Returns `Ok(None)` when the mint has no metadata account; callers
    /// synthesise placeholder fields in that case.
    pub async fn get_token_symbol_name(
        &self,
        mint: &str,
    ) -> Result<Option<(String, String)>, RpcError> {
        let mint_pubkey = self.parse_pubkey(mint)?;
        let (metadata_pda, _) = Metadata::find_pda(&mint_pubkey);

        let response = self
            .client
            .get_account_with_commitment(&metadata_pda, self.commitment)
            .await
            .map_err(|e| RpcError::RequestFailed {
                method: "getAccountInfo".to_string(),
                reason: e.to_string(),
            })?;

        let account = match response.value {
            Some(account) => account,
            None => return Ok(None),
        };

        match Metadata::safe_deserialize(&account.data) {
            Ok(metadata) => {
                // On-chain strings are fixed-width and NUL padded
                let symbol = metadata.symbol.trim_end_matches('\0').trim().to_string();
                let name = metadata.name.trim_end_matches('\0').trim().to_string();
                Ok(Some((symbol, name)))
            }
            Err(e) => {
                logger::warning(
                    LogTag::Rpc,
                    &format!("Failed to deserialize metadata for {}: {}", mint, e),
                );
                Ok(None)
            }
        }
    }

    /// One page of transaction signatures for an address, newest first.
    ///
    /// `before` continues paging backwards from a previous page's last entry.
    pub async fn signatures_for_address(
        &self,
        address: &str,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureRecord>, RpcError> {
        let pubkey = self.parse_pubkey(address)?;

        let before_sig = match before {
            Some(s) => Some(Signature::from_str(s).map_err(|e| RpcError::InvalidResponse {
                method: "getSignaturesForAddress".to_string(),
                reason: format!("invalid before signature: {}", e),
            })?),
            None => None,
        };

        let config = GetConfirmedSignaturesForAddress2Config {
            before: before_sig,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };

        let entries = self
            .client
            .get_signatures_for_address_with_config(&pubkey, config)
            .await
            .map_err(|e| RpcError::RequestFailed {
                method: "getSignaturesForAddress".to_string(),
                reason: e.to_string(),
            })?;

        Ok(entries
            .into_iter()
            .map(|e| SignatureRecord {
                signature: e.signature,
                block_time: e.block_time,
            })
            .collect())
    }

    /// Fetch a transaction and return its block time.
    pub async fn transaction_block_time(&self, signature: &str) -> Result<Option<i64>, RpcError> {
        let sig = Signature::from_str(signature).map_err(|e| RpcError::InvalidResponse {
            method: "getTransaction".to_string(),
            reason: format!("invalid signature: {}", e),
        })?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        let transaction = self
            .client
            .get_transaction_with_config(&sig, config)
            .await
            .map_err(|e| RpcError::RequestFailed {
                method: "getTransaction".to_string(),
                reason: e.to_string(),
            })?;

        Ok(transaction.block_time)
    }
}
