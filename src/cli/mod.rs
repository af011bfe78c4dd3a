//! CLI command handlers
//!
//! Bridges clap argument parsing with the encryption and session layers.

pub mod cipher;
pub mod session;

use std::io::BufRead;

use serde::Serialize;
use zeroize::Zeroizing;

use crate::config::{paths::VaultPaths, settings::Settings};
use crate::crypto::{create_hash, hash_from_hex, SecretHash};
use crate::error::{VaultError, VaultResult};
use crate::session::{session_key, FileCache, SecretCache};

pub use cipher::{
    handle_decrypt_command, handle_encrypt_command, handle_hash_command, handle_numeric_command,
    DecryptArgs, EncryptArgs, HashArgs, NumericCommands, SecretArgs,
};
pub use session::{
    handle_lock_command, handle_status_command, handle_unlock_command, OfflineOracle, UnlockArgs,
};

/// Resolved paths and settings shared by every command
pub struct CliContext {
    pub paths: VaultPaths,
    pub settings: Settings,
}

/// Show paths and settings
pub fn handle_config_command(ctx: &CliContext) -> VaultResult<()> {
    println!("envelope-vault Configuration");
    println!("============================");
    println!("Base directory:  {}", ctx.paths.base_dir().display());
    println!("Data directory:  {}", ctx.paths.data_dir().display());
    println!("Settings file:   {}", ctx.paths.settings_file().display());
    match ctx.paths.runtime_dir() {
        Some(dir) => println!("Runtime dir:     {}", dir.display()),
        None => println!("Runtime dir:     (none, sessions are not kept)"),
    }
    println!();
    println!("Settings:");
    print_json(&ctx.settings)
}

/// Find the secret: explicit hash, then the runtime session cache, then a password prompt
pub(crate) fn resolve_secret(ctx: &CliContext, secret: &SecretArgs) -> VaultResult<SecretHash> {
    if let Some(hex) = &secret.hash {
        return hash_from_hex(hex);
    }

    if let Some(path) = ctx.paths.session_file() {
        let cache = FileCache::open_private(path)?;
        if let Some(hex) = cache.get(&session_key(&ctx.settings.user_id))? {
            return hash_from_hex(&hex);
        }
    }

    let password = read_password(false)?;
    Ok(create_hash(&password))
}

/// Read a password from a hidden prompt, or the first line of stdin
pub(crate) fn read_password(from_stdin: bool) -> VaultResult<Zeroizing<String>> {
    if !from_stdin {
        return rpassword::prompt_password("Password: ")
            .map(Zeroizing::new)
            .map_err(|e| VaultError::Io(format!("Failed to read password: {}", e)));
    }

    let mut line = Zeroizing::new(String::new());
    std::io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> VaultResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
