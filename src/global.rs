use std::fs;

// ================================================================================================
// 📁 CENTRALIZED DATA PATHS - ALL FILE AND FOLDER PATHS IN ONE PLACE
// ================================================================================================

/// Data directory for all pipeline-generated files
pub const DATA_DIR: &str = "data";

/// Event database
pub const EVENTS_DATABASE: &str = "data/walletpulse.db";

/// Shared token metadata cache (disk tier)
pub const TOKEN_META_CACHE: &str = "data/token_meta_cache.json";

/// Log directory
pub const LOGS_DIR: &str = "logs";

/// Function to ensure data directory and subdirectories exist
pub fn ensure_data_directories() -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(DATA_DIR)?;
    fs::create_dir_all(LOGS_DIR)?;
    Ok(())
}

/// Get the full path for a data file (convenience function)
pub fn get_data_path(filename: &str) -> String {
    format!("{}/{}", DATA_DIR, filename)
}
