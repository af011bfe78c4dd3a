//! Cryptographic primitives for envelope-vault
//!
//! SHA-256 secret hashing, AES-256-GCM string sealing and the numeric
//! obfuscation cipher used for numbers, booleans and dates.

pub mod encryption;
pub mod hash;
pub mod numeric;

pub use encryption::{cipher_from_key, open_string, seal_string, SealedString};
pub use hash::{create_hash, hash_from_hex, secret_verifier, SecretHash};
pub use numeric::{NumericEncryptor, Scalar, MAX_SAFE_INTEGER, MAX_SAFE_PLAINTEXT};
