//! Secret hashing
//!
//! The root key material for both ciphers is the SHA-256 digest of the user's
//! password, kept in hex (for the numeric cipher and caches) and raw form (for
//! the AES key).

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{VaultError, VaultResult};

/// Length of the digest in bytes
pub const HASH_SIZE: usize = 32;

/// Length of the digest in hex characters
pub const HASH_HEX_LEN: usize = HASH_SIZE * 2;

/// Prefix marking a stored value as a verifier rather than a secret
pub const VERIFIER_PREFIX: &str = "sha256:";

/// SHA-256 digest of a password in two encodings of the same value
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretHash {
    hex: String,
    raw: [u8; HASH_SIZE],
}

impl SecretHash {
    /// Lowercase hex form (64 characters)
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Raw digest bytes
    pub fn raw(&self) -> &[u8; HASH_SIZE] {
        &self.raw
    }
}

// Never print the digest
impl fmt::Debug for SecretHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretHash").field("hex", &"[REDACTED]").finish()
    }
}

/// Hash a password with SHA-256 over its UTF-8 bytes
pub fn create_hash(password: &str) -> SecretHash {
    let digest = Sha256::digest(password.as_bytes());
    let mut raw = [0u8; HASH_SIZE];
    raw.copy_from_slice(&digest);

    SecretHash {
        hex: hex::encode(raw),
        raw,
    }
}

/// One-way verifier for a secret hex, safe to keep at rest
///
/// Already-derived verifiers are returned unchanged.
pub fn secret_verifier(secret_hex: &str) -> String {
    if secret_hex.starts_with(VERIFIER_PREFIX) {
        return secret_hex.to_string();
    }
    let digest = Sha256::digest(secret_hex.to_ascii_lowercase().as_bytes());
    format!("{}{}", VERIFIER_PREFIX, hex::encode(digest))
}

/// Rebuild a hash from its stored hex form without hashing again
pub fn hash_from_hex(hex_str: &str) -> VaultResult<SecretHash> {
    if hex_str.len() != HASH_HEX_LEN {
        return Err(VaultError::InvalidSecret(format!(
            "expected {} hex characters, got {}",
            HASH_HEX_LEN,
            hex_str.len()
        )));
    }

    let mut raw = [0u8; HASH_SIZE];
    hex::decode_to_slice(hex_str, &mut raw)
        .map_err(|e| VaultError::InvalidSecret(format!("not a hex string: {}", e)))?;

    Ok(SecretHash {
        hex: hex_str.to_ascii_lowercase(),
        raw,
    })
}
