/// Shared disk tier of the metadata cache
///
/// A JSON file under `data/` mapping mint → metadata + update timestamp.
/// Loaded once at startup, written back after every insert. Entries past the
/// TTL are ignored on read and dropped on the next save.
use super::TokenMeta;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

/// One persisted cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMeta {
    pub meta: TokenMeta,
    /// Unix seconds of the last refresh
    pub updated_at: i64,
}

/// File-backed mint metadata cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskMetaCache {
    pub entries: HashMap<String, CachedMeta>,
    #[serde(skip)]
    path: String,
}

impl DiskMetaCache {
    /// Create a new empty cache bound to a file path
    pub fn new(path: &str) -> Self {
        Self {
            entries: HashMap::new(),
            path: path.to_string(),
        }
    }

    /// Load cache from disk if it exists
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn Error>> {
        if Path::new(path).exists() {
            let data = fs::read_to_string(path)?;
            let mut cache: DiskMetaCache = serde_json::from_str(&data)?;
            cache.path = path.to_string();
            Ok(cache)
        } else {
            Ok(Self::new(path))
        }
    }

    /// Save cache to disk, dropping entries already past the TTL is left to
    /// callers; the file mirrors the in-memory map.
    pub fn save(&self) -> Result<(), Box<dyn Error>> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    /// Get a non-expired entry for a mint
    pub fn get(&self, mint: &str, ttl_secs: u64) -> Option<TokenMeta> {
        let entry = self.entries.get(mint)?;
        let age = Utc::now().timestamp() - entry.updated_at;
        if age >= 0 && (age as u64) < ttl_secs {
            Some(entry.meta.clone())
        } else {
            None
        }
    }

    /// Insert or refresh an entry
    pub fn insert(&mut self, meta: TokenMeta) {
        self.entries.insert(
            meta.mint.clone(),
            CachedMeta {
                meta,
                updated_at: Utc::now().timestamp(),
            },
        );
    }

    /// Remove an entry
    pub fn remove(&mut self, mint: &str) {
        self.entries.remove(mint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
