//! Session commands: `unlock`, `status`, `lock`
//!
//! The CLI drives a [`KeySessionManager`] over the JSON record stores named in
//! the settings. There is no remote recovery service, so recovery tokens are
//! never minted here.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use tracing::warn;

use super::{read_password, CliContext};
use crate::error::{VaultError, VaultResult};
use crate::session::{
    Collaborators, FileCache, KeySessionManager, MemoryCache, Progress, RecordStore, SecretCache,
    TokenOracle, UserDirectory,
};
use crate::storage::{JsonRecordStore, JsonUserDirectory};

#[derive(Args, Debug)]
pub struct UnlockArgs {
    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
}

/// Oracle used when no recovery service is reachable
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineOracle;

#[async_trait]
impl TokenOracle for OfflineOracle {
    async fn mint_token(&self, _secret_hex: &str) -> VaultResult<String> {
        Err(VaultError::TokenMintFailed(
            "no recovery service configured".into(),
        ))
    }

    async fn recover_hash(&self, _token: &str) -> VaultResult<String> {
        Err(VaultError::TokenRecoveryFailed(
            "no recovery service configured".into(),
        ))
    }
}

/// The file-backed collaborators of one CLI invocation
struct LocalVault {
    /// `None` when there is no runtime directory to keep the session in
    session_file: Option<Arc<FileCache>>,
    users: Arc<JsonUserDirectory>,
    manager: KeySessionManager,
}

impl LocalVault {
    fn open(ctx: &CliContext) -> VaultResult<Self> {
        let session_file = match ctx.paths.session_file() {
            Some(path) => Some(Arc::new(FileCache::open_private(path)?)),
            None => None,
        };
        let session_cache: Arc<dyn SecretCache> = match &session_file {
            Some(cache) => cache.clone() as Arc<dyn SecretCache>,
            None => Arc::new(MemoryCache::new()) as Arc<dyn SecretCache>,
        };
        let users = Arc::new(JsonUserDirectory::open(ctx.paths.users_file())?);
        let stores = ctx
            .settings
            .stores
            .iter()
            .map(|name| {
                Arc::new(JsonRecordStore::new(name.as_str(), ctx.paths.store_file(name)))
                    as Arc<dyn RecordStore>
            })
            .collect();

        let collaborators = Collaborators {
            session_cache,
            durable_cache: Arc::new(FileCache::open(ctx.paths.recovery_file())?),
            oracle: Arc::new(OfflineOracle),
            users: users.clone(),
            stores,
        };
        let manager = KeySessionManager::new(
            ctx.settings.user_id.clone(),
            collaborators,
            ctx.settings.encryption.clone(),
        );

        Ok(Self {
            session_file,
            users,
            manager,
        })
    }
}

/// Unlock with a password, migrating the stores on first use
pub async fn handle_unlock_command(ctx: &CliContext, args: UnlockArgs) -> VaultResult<()> {
    let password = read_password(args.password_stdin)?;
    let mut vault = LocalVault::open(ctx)?;

    vault.manager.unlock(&password, report_progress).await?;
    vault.manager.wait_for_recovery_token().await;

    if vault.session_file.is_none() {
        warn!("no runtime directory, the session ends with this command");
    }
    println!("Unlocked as '{}'.", ctx.settings.user_id);
    Ok(())
}

pub async fn handle_status_command(ctx: &CliContext) -> VaultResult<()> {
    let vault = LocalVault::open(ctx)?;
    let record = vault.users.read_user_record(&ctx.settings.user_id).await?;

    println!("Session Status");
    println!("==============");
    println!("User:            {}", ctx.settings.user_id);
    println!("Unlocked:        {}", vault.manager.is_unlocked_this_session()?);
    println!("Recovery token:  {}", vault.manager.has_recoverable_token()?);
    println!("Password set:    {}", record.private_hash.is_some());
    println!("Fully migrated:  {}", record.fully_migrated);
    println!("Key version:     {}", ctx.settings.encryption.current_version);
    Ok(())
}

/// Forget the session secret and remove the session file
pub fn handle_lock_command(ctx: &CliContext) -> VaultResult<()> {
    let mut vault = LocalVault::open(ctx)?;
    vault.manager.lock()?;
    if let Some(cache) = &vault.session_file {
        cache.clear()?;
    }

    println!("Locked.");
    Ok(())
}

fn report_progress(progress: Option<&Progress>) {
    match progress {
        Some(p) => match p.sub {
            Some(sub) => eprintln!(
                "[{}/{}] {}: {}/{} items",
                p.current, p.max, p.filename, sub.current, sub.max
            ),
            None if p.filename.is_empty() => eprintln!("Re-encrypting {} stores...", p.max),
            None => eprintln!("[{}/{}] {}", p.current, p.max, p.filename),
        },
        None => eprintln!("Migration complete."),
    }
}
