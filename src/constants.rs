/// Well-known addresses and unit constants used across the pipeline.

/// Wrapped SOL mint address
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// USDC mint address (mainnet)
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Lamports per SOL (SOL has 9 decimals)
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Default decimals used when a mint account cannot be read
pub const FALLBACK_TOKEN_DECIMALS: u8 = 6;

/// Accepted base58 signature length range after normalisation
pub const SIGNATURE_B58_MIN_LEN: usize = 58;
pub const SIGNATURE_B58_MAX_LEN: usize = 88;

/// Raw byte length of an ed25519 transaction signature
pub const SIGNATURE_BYTE_LEN: usize = 64;
