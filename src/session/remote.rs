//! External collaborators of the session manager
//!
//! The recovery oracle, the record stores and the user directory live outside
//! this crate; the manager only talks to them through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{secret_verifier, SecretHash};
use crate::document::Value;
use crate::error::VaultResult;

/// Remote service that wraps a secret hash into an opaque recovery token
///
/// Only the oracle can reverse a token, so the durable cache never holds
/// anything usable on its own.
#[async_trait]
pub trait TokenOracle: Send + Sync {
    /// Wrap a secret hash into an opaque token
    async fn mint_token(&self, secret_hex: &str) -> VaultResult<String>;

    /// Unwrap a token minted by [`TokenOracle::mint_token`]
    async fn recover_hash(&self, token: &str) -> VaultResult<String>;
}

/// A cached collection of documents that can be re-saved in place
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Name shown in migration progress
    fn name(&self) -> &str;

    /// Whether documents in this store are encrypted at all
    fn is_encrypted(&self) -> bool {
        true
    }

    /// Field that identifies a document; left in plaintext so upserts still match
    fn identity_field(&self) -> Option<&str> {
        Some("id")
    }

    /// Suspend until the local cache is fully loaded
    async fn wait_until_ready(&self) -> VaultResult<()>;

    /// All cached documents, each carrying its `encrypted` marker
    async fn cached_items(&self) -> VaultResult<Vec<Value>>;

    /// Upsert documents by identity
    async fn save_many(&self, items: Vec<Value>) -> VaultResult<()>;
}

/// Encryption state kept on the user's account record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Secret hash the account's data is encrypted with, or its verifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_hash: Option<String>,

    /// Whether every store has been re-saved under `private_hash`
    #[serde(default)]
    pub fully_migrated: bool,
}

/// Partial update of a [`UserRecord`]; `None` fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecordPatch {
    pub private_hash: Option<String>,
    pub fully_migrated: Option<bool>,
}

impl UserRecord {
    /// Apply a partial update
    pub fn apply(&mut self, patch: UserRecordPatch) {
        if let Some(private_hash) = patch.private_hash {
            self.private_hash = Some(private_hash);
        }
        if let Some(fully_migrated) = patch.fully_migrated {
            self.fully_migrated = fully_migrated;
        }
    }

    /// Whether the stored private hash belongs to `hash`
    ///
    /// Accepts either the hex itself or its one-way verifier.
    pub fn private_hash_matches(&self, hash: &SecretHash) -> bool {
        match self.private_hash.as_deref() {
            Some(stored) if stored == hash.hex() => true,
            Some(stored) => stored == secret_verifier(hash.hex()),
            None => false,
        }
    }
}

/// Access to user account records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn read_user_record(&self, user_id: &str) -> VaultResult<UserRecord>;
    async fn write_user_record(&self, user_id: &str, patch: UserRecordPatch) -> VaultResult<()>;
}
