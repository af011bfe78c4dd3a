//! File-backed user directory

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::crypto::secret_verifier;
use crate::error::{VaultError, VaultResult};
use crate::session::{UserDirectory, UserRecord, UserRecordPatch};

use super::file_io::{read_json, write_json_atomic};

/// User records keyed by user id, persisted to `data/users.json`
///
/// Only a verifier of the private hash reaches the disk.
pub struct JsonUserDirectory {
    path: PathBuf,
    users: RwLock<BTreeMap<String, UserRecord>>,
}

impl JsonUserDirectory {
    pub fn open(path: PathBuf) -> VaultResult<Self> {
        let users = read_json(&path)?;
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }
}

#[async_trait]
impl UserDirectory for JsonUserDirectory {
    async fn read_user_record(&self, user_id: &str) -> VaultResult<UserRecord> {
        let users = self.users.read().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(users.get(user_id).cloned().unwrap_or_default())
    }

    async fn write_user_record(&self, user_id: &str, mut patch: UserRecordPatch) -> VaultResult<()> {
        patch.private_hash = patch.private_hash.map(|hex| secret_verifier(&hex));
        let mut users = self.users.write().map_err(|e| {
            VaultError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        users.entry(user_id.to_string()).or_default().apply(patch);
        write_json_atomic(&self.path, &*users)
    }
}
