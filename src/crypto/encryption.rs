//! AES-256-GCM string encryption
//!
//! Each call draws a fresh 96-bit nonce, so the same plaintext never produces
//! the same ciphertext. The wire form is `base64(nonce):base64(ciphertext+tag)`.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{VaultError, VaultResult};

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Separator between nonce and ciphertext on the wire
const SEPARATOR: char = ':';

/// A sealed string split into its two base64 parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedString {
    /// The nonce used for this encryption (base64 encoded)
    pub nonce: String,
    /// The ciphertext with authentication tag (base64 encoded)
    pub ciphertext: String,
}

impl SealedString {
    fn new(nonce: &[u8], ciphertext: &[u8]) -> Self {
        Self {
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        }
    }

    /// Parse the `nonce:ciphertext` wire form
    pub fn parse(wire: &str) -> VaultResult<Self> {
        let (nonce, ciphertext) = wire.split_once(SEPARATOR).ok_or_else(|| {
            VaultError::Encryption("Missing nonce separator".to_string())
        })?;

        Ok(Self {
            nonce: nonce.to_string(),
            ciphertext: ciphertext.to_string(),
        })
    }

    /// Render the `nonce:ciphertext` wire form
    pub fn to_wire(&self) -> String {
        format!("{}{}{}", self.nonce, SEPARATOR, self.ciphertext)
    }

    fn decode_nonce(&self) -> VaultResult<Vec<u8>> {
        STANDARD
            .decode(&self.nonce)
            .map_err(|e| VaultError::Encryption(format!("Invalid nonce encoding: {}", e)))
    }

    fn decode_ciphertext(&self) -> VaultResult<Vec<u8>> {
        STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| VaultError::Encryption(format!("Invalid ciphertext encoding: {}", e)))
    }
}

/// Build an AES-256-GCM cipher from raw key bytes
///
/// The key bytes are consumed into the cipher state and never handed back out.
pub fn cipher_from_key(key: &[u8; 32]) -> VaultResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Encryption(format!("Failed to create cipher: {}", e)))
}

/// Encrypt a string, returning the wire form
pub fn seal_string(plaintext: &str, cipher: &Aes256Gcm) -> VaultResult<String> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| VaultError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok(SealedString::new(&nonce_bytes, &ciphertext).to_wire())
}

/// Decrypt a string from its wire form
pub fn open_string(wire: &str, cipher: &Aes256Gcm) -> VaultResult<String> {
    let sealed = SealedString::parse(wire)?;

    let nonce_bytes = sealed.decode_nonce()?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(VaultError::Encryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = sealed.decode_ciphertext()?;

    let plaintext = cipher.decrypt(nonce, ciphertext.as_ref()).map_err(|_| {
        VaultError::Encryption("Decryption failed: invalid key or corrupted data".to_string())
    })?;

    String::from_utf8(plaintext)
        .map_err(|e| VaultError::Encryption(format!("Invalid UTF-8 in decrypted data: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::create_hash;

    fn test_cipher(password: &str) -> Aes256Gcm {
        cipher_from_key(create_hash(password).raw()).unwrap()
    }

    #[test]
    fn test_seal_open_string() {
        let cipher = test_cipher("test_passphrase");
        let sealed = seal_string("Groceries", &cipher).unwrap();
        assert_eq!(open_string(&sealed, &cipher).unwrap(), "Groceries");
    }

    #[test]
    fn test_wire_format() {
        let cipher = test_cipher("test_passphrase");
        let sealed = seal_string("Rent", &cipher).unwrap();

        let parsed = SealedString::parse(&sealed).unwrap();
        assert_eq!(STANDARD.decode(&parsed.nonce).unwrap().len(), NONCE_SIZE);
        // 4 bytes of plaintext + 16 byte tag
        assert_eq!(STANDARD.decode(&parsed.ciphertext).unwrap().len(), 20);
        assert_eq!(parsed.to_wire(), sealed);
    }

    #[test]
    fn test_different_nonces() {
        let cipher = test_cipher("test_passphrase");
        let first = seal_string("Hello, World!", &cipher).unwrap();
        let second = seal_string("Hello, World!", &cipher).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal_string("Hello, World!", &test_cipher("one")).unwrap();
        assert!(open_string(&sealed, &test_cipher("two")).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = test_cipher("test_passphrase");
        let mut sealed = SealedString::parse(&seal_string("Hello", &cipher).unwrap()).unwrap();

        let mut bytes = STANDARD.decode(&sealed.ciphertext).unwrap();
        bytes[0] ^= 0xFF;
        sealed.ciphertext = STANDARD.encode(&bytes);

        assert!(open_string(&sealed.to_wire(), &cipher).is_err());
    }

    #[test]
    fn test_missing_separator_fails() {
        let cipher = test_cipher("test_passphrase");
        assert!(open_string("bm9wZQ==", &cipher).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let cipher = test_cipher("test_passphrase");
        let sealed = seal_string("", &cipher).unwrap();
        assert_eq!(open_string(&sealed, &cipher).unwrap(), "");
    }
}
