//! Password unlock and bulk re-encryption
//!
//! The manager owns one user's [`Session`] from unlock to lock. Unlocking
//! derives the secret from the password, checks it against the hash stored on
//! the user record, and re-encrypts every record store when the account has
//! never been (or not fully been) migrated.
//!
//! Migration has no rollback. Items that already carry a truthy `encrypted`
//! marker are skipped, so an interrupted pass is finished by the next unlock.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::settings::EncryptionSettings;
use crate::crypto::{create_hash, hash_from_hex, SecretHash};
use crate::document::{DecryptOptions, DocumentEncryptor, EncryptOptions, Value, ENCRYPTED_FIELD};
use crate::error::{VaultError, VaultResult};

use super::cache::{recovery_key, session_key, SecretCache};
use super::progress::{Progress, SubProgress};
use super::remote::{RecordStore, TokenOracle, UserDirectory, UserRecordPatch};

/// Where a user's session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Locked,
    Unlocking,
    MigrationInProgress,
    Unlocked,
}

/// Everything the manager reaches outside this crate for
pub struct Collaborators {
    /// Cleared when the session ends; holds the secret hex
    pub session_cache: Arc<dyn SecretCache>,
    /// Survives restarts; holds only the opaque recovery token
    pub durable_cache: Arc<dyn SecretCache>,
    pub oracle: Arc<dyn TokenOracle>,
    pub users: Arc<dyn UserDirectory>,
    /// Processed in this order during migration
    pub stores: Vec<Arc<dyn RecordStore>>,
}

/// An unlocked session: created by unlock, dropped by lock
pub struct Session {
    user_id: String,
    encryptor: Arc<DocumentEncryptor>,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Encryptor for documents flowing to and from the record stores
    pub fn encryptor(&self) -> &Arc<DocumentEncryptor> {
        &self.encryptor
    }

    /// Options that keep `store`'s identity field in plaintext
    pub fn encrypt_options(&self, store: &dyn RecordStore) -> EncryptOptions {
        encrypt_options_for(store)
    }

    /// Options that pass `store`'s identity field through untouched
    ///
    /// Needed whenever the identity is not a string, since a plaintext number
    /// would otherwise go through the numeric cipher.
    pub fn decrypt_options(&self, store: &dyn RecordStore) -> DecryptOptions {
        match store.identity_field() {
            Some(field) => DecryptOptions::new().ignore(field),
            None => DecryptOptions::new(),
        }
    }
}

fn encrypt_options_for(store: &dyn RecordStore) -> EncryptOptions {
    match store.identity_field() {
        Some(field) => EncryptOptions::new().ignore(field),
        None => EncryptOptions::new(),
    }
}

/// Drives unlock, recovery and migration for one user
pub struct KeySessionManager {
    user_id: String,
    settings: EncryptionSettings,
    collaborators: Collaborators,
    state: SessionState,
    session: Option<Session>,
    token_task: Option<JoinHandle<()>>,
}

impl KeySessionManager {
    pub fn new(
        user_id: impl Into<String>,
        collaborators: Collaborators,
        settings: EncryptionSettings,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            settings,
            collaborators,
            state: SessionState::Locked,
            session: None,
            token_task: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The unlocked session, if any
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Check whether the session cache holds this user's secret
    pub fn is_unlocked_this_session(&self) -> VaultResult<bool> {
        Ok(self
            .collaborators
            .session_cache
            .get(&session_key(&self.user_id))?
            .is_some())
    }

    /// Check whether a recovery token is stored, so a silent unlock can be tried
    pub fn has_recoverable_token(&self) -> VaultResult<bool> {
        Ok(self
            .collaborators
            .durable_cache
            .get(&recovery_key(&self.user_id))?
            .is_some())
    }

    /// Find the secret without asking for a password
    ///
    /// Tries the session cache first, then exchanges the durable recovery
    /// token with the oracle. `None` means the caller has to prompt.
    pub async fn get_hash(&self) -> VaultResult<Option<SecretHash>> {
        let key = session_key(&self.user_id);
        if let Some(hex) = self.collaborators.session_cache.get(&key)? {
            return hash_from_hex(&hex).map(Some);
        }

        let Some(token) = self
            .collaborators
            .durable_cache
            .get(&recovery_key(&self.user_id))?
        else {
            return Ok(None);
        };

        let hex = Zeroizing::new(
            self.collaborators
                .oracle
                .recover_hash(&token)
                .await
                .map_err(recovery_error)?,
        );
        let hash = hash_from_hex(&hex).map_err(recovery_error)?;

        self.collaborators.session_cache.set(&key, hash.hex())?;
        debug!(user_id = %self.user_id, "recovered secret from durable token");
        Ok(Some(hash))
    }

    /// Unlock with a password
    ///
    /// Accounts without a stored hash, or whose last migration did not finish,
    /// are migrated under the new secret instead of being checked against it.
    /// Any failure leaves the manager locked.
    pub async fn unlock<F>(&mut self, password: &str, mut on_progress: F) -> VaultResult<()>
    where
        F: FnMut(Option<&Progress>),
    {
        self.session = None;
        self.state = SessionState::Unlocking;

        match self.unlock_with(password, &mut on_progress).await {
            Ok(session) => {
                self.session = Some(session);
                self.state = SessionState::Unlocked;
                info!(user_id = %self.user_id, "vault unlocked");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Locked;
                Err(e)
            }
        }
    }

    /// Restore a session from [`get_hash`](Self::get_hash) without a password
    ///
    /// Returns `false` when no secret is available.
    pub async fn resume(&mut self) -> VaultResult<bool> {
        let Some(hash) = self.get_hash().await? else {
            return Ok(false);
        };

        let encryptor = DocumentEncryptor::with_hash(&hash, self.settings.current_version.clone())?;
        self.session = Some(Session {
            user_id: self.user_id.clone(),
            encryptor: Arc::new(encryptor),
        });
        self.state = SessionState::Unlocked;
        debug!(user_id = %self.user_id, "session resumed");
        Ok(true)
    }

    /// Re-encrypt every unencrypted item of every participating store under `hash`
    pub async fn migrate<F>(&mut self, hash: &SecretHash, mut on_progress: F) -> VaultResult<()>
    where
        F: FnMut(Option<&Progress>),
    {
        let encryptor = DocumentEncryptor::with_hash(hash, self.settings.current_version.clone())?;
        let previous = self.state;
        let result = self.run_migration(&encryptor, hash, &mut on_progress).await;
        self.state = previous;
        result
    }

    /// End the session: forget the secret and drop the encryptor
    ///
    /// The durable recovery token is kept.
    pub fn lock(&mut self) -> VaultResult<()> {
        self.session = None;
        self.state = SessionState::Locked;
        self.collaborators
            .session_cache
            .remove(&session_key(&self.user_id))?;
        debug!(user_id = %self.user_id, "session locked");
        Ok(())
    }

    /// Wait for the recovery token minted by the last unlock to be stored
    pub async fn wait_for_recovery_token(&mut self) {
        if let Some(task) = self.token_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "recovery token task did not finish");
            }
        }
    }

    async fn unlock_with<F>(&mut self, password: &str, on_progress: &mut F) -> VaultResult<Session>
    where
        F: FnMut(Option<&Progress>),
    {
        let hash = create_hash(password);
        let encryptor = DocumentEncryptor::with_hash(&hash, self.settings.current_version.clone())?;

        let record = self
            .collaborators
            .users
            .read_user_record(&self.user_id)
            .await?;

        if record.private_hash.is_none() || !record.fully_migrated {
            info!(user_id = %self.user_id, "account not fully migrated, re-encrypting stores");
            self.run_migration(&encryptor, &hash, on_progress).await?;
        } else if !record.private_hash_matches(&hash) {
            return Err(VaultError::InvalidPassword);
        }

        self.collaborators
            .session_cache
            .set(&session_key(&self.user_id), hash.hex())?;
        self.spawn_token_mint(&hash);

        Ok(Session {
            user_id: self.user_id.clone(),
            encryptor: Arc::new(encryptor),
        })
    }

    async fn run_migration<F>(
        &mut self,
        encryptor: &DocumentEncryptor,
        hash: &SecretHash,
        on_progress: &mut F,
    ) -> VaultResult<()>
    where
        F: FnMut(Option<&Progress>),
    {
        self.state = SessionState::MigrationInProgress;

        let stores: Vec<Arc<dyn RecordStore>> = self
            .collaborators
            .stores
            .iter()
            .filter(|store| store.is_encrypted())
            .cloned()
            .collect();
        let chunk_size = self.settings.migration_chunk_size.max(1);

        let mut progress = Progress::resave(stores.len());
        on_progress(Some(&progress));

        for store in &stores {
            progress.filename = store.name().to_string();
            progress.sub = None;

            store.wait_until_ready().await?;
            let items = store.cached_items().await?;
            let options = encrypt_options_for(store.as_ref());

            let mut done = 0;
            let mut written = 0;
            for chunk in items.chunks(chunk_size) {
                let pending = chunk
                    .iter()
                    .filter(|item| !is_encrypted(item))
                    .map(|item| encryptor.encrypt_with(without_marker(item.clone()), &options))
                    .collect::<VaultResult<Vec<_>>>()?;

                if !pending.is_empty() {
                    written += pending.len();
                    store.save_many(pending).await?;
                }

                done += chunk.len();
                progress.sub = Some(SubProgress {
                    current: done,
                    max: items.len(),
                });
                on_progress(Some(&progress));
                debug!(store = store.name(), done, total = items.len(), "migrated chunk");
            }

            progress.current += 1;
            on_progress(Some(&progress));
            info!(store = store.name(), written, "store migrated");
        }

        self.collaborators
            .users
            .write_user_record(
                &self.user_id,
                UserRecordPatch {
                    private_hash: Some(hash.hex().to_string()),
                    fully_migrated: Some(true),
                },
            )
            .await?;

        on_progress(None);
        Ok(())
    }

    /// Persist a recovery token in the background; unlock does not wait for it
    fn spawn_token_mint(&mut self, hash: &SecretHash) {
        let oracle = Arc::clone(&self.collaborators.oracle);
        let durable = Arc::clone(&self.collaborators.durable_cache);
        let key = recovery_key(&self.user_id);
        let secret = Zeroizing::new(hash.hex().to_string());

        self.token_task = Some(tokio::spawn(async move {
            let stored = match oracle.mint_token(&secret).await {
                Ok(token) => durable.set(&key, &token),
                Err(e) => Err(mint_error(e)),
            };
            if let Err(e) = stored {
                warn!(error = %e, "recovery token not stored");
            }
        }));
    }
}

fn is_encrypted(item: &Value) -> bool {
    item.get(ENCRYPTED_FIELD).is_some_and(Value::is_truthy)
}

/// Drop a falsy marker so the encryptor neither skips nor rejects the item
fn without_marker(item: Value) -> Value {
    match item {
        Value::Map(mut map) => {
            map.remove(ENCRYPTED_FIELD);
            Value::Map(map)
        }
        other => other,
    }
}

fn mint_error(err: VaultError) -> VaultError {
    match err {
        VaultError::TokenMintFailed(_) => err,
        other => VaultError::TokenMintFailed(other.to_string()),
    }
}

fn recovery_error(err: VaultError) -> VaultError {
    match err {
        VaultError::TokenRecoveryFailed(_) => err,
        other => VaultError::TokenRecoveryFailed(other.to_string()),
    }
}
