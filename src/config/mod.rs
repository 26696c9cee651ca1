/// Configuration module - organized config system with zero repetition
///
/// # Architecture
///
/// - `macros.rs` - The `config_struct!` macro for defining configs with embedded defaults
/// - `schemas.rs` - All configuration structures defined once with defaults
/// - `utils.rs` - Loading, reloading, environment overrides, and access utilities
///
/// # Usage
///
/// ## Loading configuration at startup:
/// ```rust,ignore
/// use walletpulse::config::load_config;
///
/// load_config()?;
/// ```
///
/// ## Accessing configuration (one-liner):
/// ```rust,ignore
/// use walletpulse::config::with_config;
///
/// let batch_size = with_config(|cfg| cfg.ingest.batch_size);
/// ```
///
/// ## Hot-reloading configuration:
/// ```rust,ignore
/// use walletpulse::config::reload_config;
///
/// // After modifying data/config.toml
/// reload_config()?;
/// ```
///
/// Environment variables override file values for deployment-critical knobs
/// (`GRPC_ENDPOINT`, `SOL_BUY_THRESHOLD`, `BATCH_SIZE`, ...); see `utils.rs`.

// Export the macro
#[macro_use]
mod macros;

// Export schemas (all config structures)
pub mod schemas;

// Export utilities (loading, reloading, access)
pub mod utils;

pub use schemas::{
    ClassifierConfig, Config, DatabaseConfig, IngestConfig, MetadataConfig, RpcConfig,
    SolPriceConfig, StreamConfig,
};

pub use utils::{
    get_config_clone, is_config_initialized, load_config, load_config_from_path, reload_config,
    with_config, CONFIG, CONFIG_FILE_PATH,
};
