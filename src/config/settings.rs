//! User settings for envelope-vault

use serde::{Deserialize, Serialize};

use super::paths::VaultPaths;
use crate::document::EncryptionVersion;
use crate::error::{VaultError, VaultResult};
use crate::storage::file_io::write_json_atomic;

/// Encryption settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// Version newly encrypted documents are stamped with
    #[serde(default)]
    pub current_version: EncryptionVersion,

    /// Items re-saved per batch during migration
    #[serde(default = "default_chunk_size")]
    pub migration_chunk_size: usize,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            current_version: EncryptionVersion::default(),
            migration_chunk_size: default_chunk_size(),
        }
    }
}

/// Settings persisted to `config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Account whose records the local stores hold
    #[serde(default = "default_user_id")]
    pub user_id: String,

    #[serde(default)]
    pub encryption: EncryptionSettings,

    /// Record stores that take part in encryption, in migration order
    #[serde(default = "default_stores")]
    pub stores: Vec<String>,
}

fn default_schema_version() -> u32 {
    1
}

fn default_user_id() -> String {
    "local".to_string()
}

fn default_chunk_size() -> usize {
    100
}

fn default_stores() -> Vec<String> {
    ["accounts", "cards", "categories", "transactions", "groceries"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            user_id: default_user_id(),
            encryption: EncryptionSettings::default(),
            stores: default_stores(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or defaults if the file doesn't exist
    pub fn load_or_create(paths: &VaultPaths) -> VaultResult<Self> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            // Not saved until the caller asks
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| VaultError::Io(format!("Failed to read settings file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&contents)
            .map_err(|e| VaultError::Config(format!("Failed to parse settings file: {}", e)))?;

        if settings.encryption.current_version.is_reserved() {
            return Err(VaultError::InvalidVersion(
                settings.encryption.current_version.to_string(),
            ));
        }

        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &VaultPaths) -> VaultResult<()> {
        write_json_atomic(paths.settings_file(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.user_id, "local");
        assert_eq!(settings.encryption.current_version, EncryptionVersion::Flag(true));
        assert_eq!(settings.encryption.migration_chunk_size, 100);
        assert_eq!(settings.stores.len(), 5);
        assert_eq!(settings.stores[0], "accounts");
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = Settings::default();
        settings.encryption.current_version = EncryptionVersion::Number(2);
        settings.stores = vec!["transactions".into()];
        settings.save(&paths).unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"encryption": {"current_version": "v3"}}"#)
            .unwrap();

        let loaded = Settings::load_or_create(&paths).unwrap();
        assert_eq!(loaded.encryption.current_version, EncryptionVersion::from("v3"));
        assert_eq!(loaded.encryption.migration_chunk_size, 100);
        assert_eq!(loaded.user_id, "local");
    }

    #[test]
    fn test_false_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let paths = VaultPaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"encryption": {"current_version": false}}"#)
            .unwrap();

        assert!(matches!(
            Settings::load_or_create(&paths),
            Err(VaultError::InvalidVersion(_))
        ));
    }
}
