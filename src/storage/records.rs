//! File-backed record store
//!
//! Each store is one JSON file under `data/`, holding its documents exactly as
//! persisted: already-encrypted documents carry their `encrypted` marker,
//! plaintext ones do not.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Value;
use crate::error::{VaultError, VaultResult};
use crate::session::RecordStore;

use super::file_io::{read_json, write_json_atomic};

/// On-disk shape of a store file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default)]
    items: Vec<Value>,
}

/// Store of documents persisted to a single JSON file, upserted by `id`
pub struct JsonRecordStore {
    name: String,
    path: PathBuf,
    encrypted: bool,
    items: RwLock<Option<Vec<Value>>>,
}

impl JsonRecordStore {
    pub fn new(name: impl Into<String>, path: PathBuf) -> Self {
        Self {
            name: name.into(),
            path,
            encrypted: true,
            items: RwLock::new(None),
        }
    }

    /// Keep this store's documents out of encryption and migration
    pub fn unencrypted(mut self) -> Self {
        self.encrypted = false;
        self
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load documents from disk, replacing the cache
    pub fn load(&self) -> VaultResult<()> {
        let file: RecordFile = read_json(&self.path)?;
        let mut items = self.items.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        debug!(store = %self.name, count = file.items.len(), "store loaded");
        *items = Some(file.items);
        Ok(())
    }

    /// Cached documents, loading them first if needed
    pub fn items(&self) -> VaultResult<Vec<Value>> {
        if !self.is_loaded()? {
            self.load()?;
        }
        let items = self.items.read().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(items.clone().unwrap_or_default())
    }

    /// Insert or replace documents and persist the store
    pub fn upsert_many(&self, incoming: Vec<Value>) -> VaultResult<()> {
        if !self.is_loaded()? {
            self.load()?;
        }

        let mut items = self.items.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        let stored = items.get_or_insert_with(Vec::new);

        for item in incoming {
            let position = item
                .get("id")
                .and_then(|id| stored.iter().position(|existing| existing.get("id") == Some(id)));
            match position {
                Some(index) => stored[index] = item,
                None => stored.push(item),
            }
        }

        write_json_atomic(
            &self.path,
            &RecordFile {
                items: stored.clone(),
            },
        )
    }

    fn is_loaded(&self) -> VaultResult<bool> {
        let items = self.items.read().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(items.is_some())
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    async fn wait_until_ready(&self) -> VaultResult<()> {
        if !self.is_loaded()? {
            self.load()?;
        }
        Ok(())
    }

    async fn cached_items(&self) -> VaultResult<Vec<Value>> {
        self.items()
    }

    async fn save_many(&self, items: Vec<Value>) -> VaultResult<()> {
        self.upsert_many(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn account(id: &str, balance: i64) -> Value {
        Value::map([("id", Value::from(id)), ("balance", Value::Int(balance))])
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonRecordStore::new("accounts", temp_dir.path().join("accounts.json"));

        assert!(store.items().unwrap().is_empty());
        assert!(store.is_encrypted());
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("accounts.json");
        let store = JsonRecordStore::new("accounts", path.clone());

        store.upsert_many(vec![account("a1", 10), account("a2", 20)]).unwrap();
        store.upsert_many(vec![account("a1", 15)]).unwrap();

        let reopened = JsonRecordStore::new("accounts", path);
        assert_eq!(reopened.items().unwrap(), vec![account("a1", 15), account("a2", 20)]);
    }

    #[test]
    fn test_items_without_id_are_appended() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonRecordStore::new("groceries", temp_dir.path().join("groceries.json"));

        let note = Value::map([("text", Value::from("milk"))]);
        store.upsert_many(vec![note.clone()]).unwrap();
        store.upsert_many(vec![note]).unwrap();

        assert_eq!(store.items().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_record_store_trait() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonRecordStore::new("cards", temp_dir.path().join("cards.json")).unencrypted();

        store.wait_until_ready().await.unwrap();
        store.save_many(vec![account("c1", 1)]).await.unwrap();

        assert!(!store.is_encrypted());
        assert_eq!(store.cached_items().await.unwrap(), vec![account("c1", 1)]);
    }
}
