//! Path management for envelope-vault
//!
//! ## Path Resolution Order
//!
//! 1. `ENVELOPE_VAULT_DATA_DIR` environment variable (if set)
//! 2. The platform config directory (`~/.config/envelope-vault` on Linux)
//!
//! The session cache holds the plaintext secret, so it lives in the runtime
//! directory (`ENVELOPE_VAULT_RUNTIME_DIR`, else `$XDG_RUNTIME_DIR`), never
//! under the base directory. Without a runtime directory nothing is cached.

use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{VaultError, VaultResult};

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "ENVELOPE_VAULT_DATA_DIR";

/// Environment variable overriding the volatile runtime directory
pub const RUNTIME_DIR_ENV: &str = "ENVELOPE_VAULT_RUNTIME_DIR";

/// Manages all paths used by envelope-vault
#[derive(Debug, Clone)]
pub struct VaultPaths {
    base_dir: PathBuf,
    runtime_dir: Option<PathBuf>,
}

impl VaultPaths {
    /// Resolve the base directory from the environment or the platform
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn new() -> VaultResult<Self> {
        let base_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(custom) => PathBuf::from(custom),
            None => ProjectDirs::from("", "", "envelope-vault")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| {
                    VaultError::Config("Could not determine a home directory".into())
                })?,
        };

        Ok(Self::with_base_dir(base_dir))
    }

    /// Use a fixed base directory (tests, `--data-dir`)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            runtime_dir: resolve_runtime_dir(),
        }
    }

    /// Replace the runtime directory; `None` keeps the session in memory only
    pub fn with_runtime_dir(mut self, runtime_dir: Option<PathBuf>) -> Self {
        self.runtime_dir = runtime_dir;
        self
    }

    pub fn runtime_dir(&self) -> Option<&PathBuf> {
        self.runtime_dir.as_ref()
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory holding record stores and user records
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// File backing the record store called `name`
    pub fn store_file(&self, name: &str) -> PathBuf {
        self.data_dir().join(format!("{}.json", name))
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir().join("users.json")
    }

    /// Durable cache of recovery tokens
    pub fn recovery_file(&self) -> PathBuf {
        self.base_dir.join("recovery.json")
    }

    /// Session cache in the runtime directory; removed by `lock`
    pub fn session_file(&self) -> Option<PathBuf> {
        self.runtime_dir.as_ref().map(|dir| dir.join("session.json"))
    }

    /// Create the base and data directories
    pub fn ensure_directories(&self) -> VaultResult<()> {
        std::fs::create_dir_all(self.data_dir())
            .map_err(|e| VaultError::Io(format!("Failed to create data directory: {}", e)))
    }
}

fn resolve_runtime_dir() -> Option<PathBuf> {
    match std::env::var_os(RUNTIME_DIR_ENV) {
        Some(custom) => Some(PathBuf::from(custom)),
        None => ProjectDirs::from("", "", "envelope-vault")
            .and_then(|dirs| dirs.runtime_dir().map(|dir| dir.to_path_buf())),
    }
}
