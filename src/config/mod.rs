//! Configuration: path resolution and persisted settings

pub mod paths;
pub mod settings;

pub use paths::VaultPaths;
pub use settings::{EncryptionSettings, Settings};
