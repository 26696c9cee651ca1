/// Configuration utilities - loading, reloading, and access helpers
///
/// - Loading configuration from disk (TOML, defaults when absent)
/// - Environment variable overrides for deployment-critical knobs
/// - Hot-reloading configuration at runtime
/// - Thread-safe access helpers
use super::schemas::Config;
use once_cell::sync::OnceCell;
use std::sync::RwLock;

/// Global configuration instance
///
/// This is the single source of truth for all configuration values.
/// Access it using the helper functions below.
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/config.toml";

/// Load configuration from disk and initialize the global CONFIG
///
/// This should be called once at startup. If the config file doesn't exist,
/// it will use default values from the schema definitions. Environment
/// variables are applied on top of whatever the file provided.
pub fn load_config() -> Result<(), String> {
    load_config_from_path(CONFIG_FILE_PATH)
}

/// Load configuration from a specific file path
pub fn load_config_from_path(path: &str) -> Result<(), String> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config);

    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| "Config already initialized".to_string())?;

    Ok(())
}

/// Reload configuration from disk
///
/// The configuration is atomically replaced, so reads are always consistent.
/// Environment overrides are re-applied after the file read.
pub fn reload_config() -> Result<(), String> {
    let mut new_config = read_config_file(CONFIG_FILE_PATH)?;
    apply_env_overrides(&mut new_config);

    if let Some(config_lock) = CONFIG.get() {
        let mut config = config_lock
            .write()
            .map_err(|e| format!("Failed to acquire config write lock: {}", e))?;
        *config = new_config;
        Ok(())
    } else {
        Err("Config not initialized. Call load_config() first.".to_string())
    }
}

fn read_config_file(path: &str) -> Result<Config, String> {
    if std::path::Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path, e))?;

        toml::from_str::<Config>(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path, e))
    } else {
        eprintln!(
            "⚠️  Config file '{}' not found, using default values",
            path
        );
        Ok(Config::default())
    }
}

/// Apply conventional environment variable overrides
///
/// These names match the deployment environment of the service; a set
/// variable always wins over the file value.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("GRPC_ENDPOINT") {
        config.stream.endpoint = v;
    }
    if let Ok(v) = std::env::var("GRPC_X_TOKEN") {
        config.stream.x_token = v;
    }
    if let Ok(v) = std::env::var("GRPC_CHUNK_SIZE") {
        if let Ok(n) = v.parse() {
            config.stream.chunk_size = n;
        }
    }
    if let Ok(v) = std::env::var("SOL_BUY_THRESHOLD") {
        if let Ok(n) = v.parse() {
            config.classifier.buy_threshold_sol = n;
        }
    }
    if let Ok(v) = std::env::var("SOL_SELL_THRESHOLD") {
        if let Ok(n) = v.parse() {
            config.classifier.sell_threshold_sol = n;
        }
    }
    if let Ok(v) = std::env::var("BATCH_SIZE") {
        if let Ok(n) = v.parse() {
            config.ingest.batch_size = n;
        }
    }
    if let Ok(v) = std::env::var("BATCH_TIMEOUT_MS") {
        if let Ok(n) = v.parse() {
            config.ingest.batch_timeout_ms = n;
        }
    }
    if let Ok(v) = std::env::var("RPC_URL") {
        config.rpc.url = v;
    }
    if let Ok(v) = std::env::var("DATABASE_PATH") {
        config.database.path = v;
    }
}

/// Check whether the global config has been initialized
pub fn is_config_initialized() -> bool {
    CONFIG.get().is_some()
}

/// Execute a function with read access to the configuration
///
/// This is the recommended way to read configuration values.
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    let config_lock = CONFIG
        .get()
        .expect("Config not initialized. Call load_config() first.");

    let config = config_lock.read().expect("Failed to acquire config read lock");

    f(&config)
}

/// Get a clone of the entire configuration
///
/// Useful when config values must be held across await points.
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}
