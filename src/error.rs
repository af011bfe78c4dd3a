//! Error types for envelope-vault
//!
//! One variant per failure the encryption layer can surface. Structural errors
//! (`InvalidSecret`, `InvalidTag`, `ReservedKeyCollision`, `UnsupportedValueType`)
//! mean a caller broke a contract and abort the current operation.

use thiserror::Error;

/// The main error type for envelope-vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Storage errors (record stores, caches)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Failure inside the AES-GCM primitive
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Secret hash is not 64 hex characters
    #[error("Invalid secret: {0}")]
    InvalidSecret(String),

    /// The numeric cipher would leave the exactly-representable integer range
    #[error("Encrypted value overflow: {0}")]
    EncryptedValueOverflow(String),

    /// A tagged scalar could not be decoded
    #[error("Invalid tag in encrypted value {0}")]
    InvalidTag(i64),

    /// A numeric ciphertext is not the image of any tagged scalar
    #[error("Corrupt numeric ciphertext: {0}")]
    CorruptCiphertext(String),

    /// The document already carried the reserved `encrypted` field
    #[error("Reserved key collision: field 'encrypted' already set to {0}")]
    ReservedKeyCollision(String),

    /// The value cannot be represented by the cipher
    #[error("Unsupported value type: {0}")]
    UnsupportedValueType(String),

    /// `false` cannot name a key version; it marks opted-out subtrees
    #[error("Invalid encryption version: {0}")]
    InvalidVersion(String),

    /// No key is loaded for the requested version
    #[error("No key loaded for encryption version {0}")]
    KeyUnavailable(String),

    /// Password does not match the one the account was encrypted with
    #[error("Invalid password")]
    InvalidPassword,

    /// The recovery oracle could not mint a token
    #[error("Failed to mint recovery token: {0}")]
    TokenMintFailed(String),

    /// The recovery oracle could not turn a token back into a hash
    #[error("Failed to recover secret from token: {0}")]
    TokenRecoveryFailed(String),
}

impl VaultError {
    /// Check if this is a password mismatch
    pub fn is_invalid_password(&self) -> bool {
        matches!(self, Self::InvalidPassword)
    }

    /// Check if this error signals a contract violation by the caller
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidSecret(_)
                | Self::InvalidTag(_)
                | Self::ReservedKeyCollision(_)
                | Self::UnsupportedValueType(_)
        )
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for envelope-vault operations
pub type VaultResult<T> = Result<T, VaultError>;
