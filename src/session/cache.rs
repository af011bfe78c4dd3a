//! Secret caches
//!
//! Two scopes hold unlock material between calls: a session cache with the
//! raw secret hex (gone when the session ends) and a durable cache with the
//! opaque recovery token only the remote oracle can turn back into a hash.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::{VaultError, VaultResult};
use crate::storage::file_io::{read_json, write_json_atomic, write_json_private};

/// Key/value store for unlock material
pub trait SecretCache: Send + Sync {
    fn get(&self, key: &str) -> VaultResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> VaultResult<()>;
    fn remove(&self, key: &str) -> VaultResult<()>;
}

/// Session-cache key holding a user's secret hex
pub fn session_key(user_id: &str) -> String {
    format!("{}/secret-hash", user_id)
}

/// Durable-cache key holding a user's recovery token
pub fn recovery_key(user_id: &str) -> String {
    format!("{}/recovery-token", user_id)
}

/// Process-lifetime cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretCache for MemoryCache {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let entries = self.entries.read().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        let mut entries = self.entries.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        let mut entries = self.entries.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        entries.remove(key);
        Ok(())
    }
}

/// Cache persisted to a JSON file, rewritten atomically on every change
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    private: bool,
    entries: RwLock<HashMap<String, String>>,
}

impl FileCache {
    /// Open the cache at `path`, loading existing entries
    pub fn open(path: PathBuf) -> VaultResult<Self> {
        let entries: HashMap<String, String> = read_json(&path)?;
        Ok(Self {
            path,
            private: false,
            entries: RwLock::new(entries),
        })
    }

    /// Open a cache whose file only its owner can read
    ///
    /// Meant for a volatile runtime directory; the file holds secrets.
    pub fn open_private(path: PathBuf) -> VaultResult<Self> {
        let mut cache = Self::open(path)?;
        cache.private = true;
        Ok(cache)
    }

    /// Delete the backing file and forget all entries
    pub fn clear(&self) -> VaultResult<()> {
        let mut entries = self.entries.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        entries.clear();

        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                VaultError::Storage(format!("Failed to remove {}: {}", self.path.display(), e))
            })?;
        }
        Ok(())
    }

    fn update<F>(&self, change: F) -> VaultResult<()>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut entries = self.entries.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        change(&mut entries);
        if self.private {
            write_json_private(&self.path, &*entries)
        } else {
            write_json_atomic(&self.path, &*entries)
        }
    }
}

impl SecretCache for FileCache {
    fn get(&self, key: &str) -> VaultResult<Option<String>> {
        let entries = self.entries.read().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> VaultResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> VaultResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
