//! envelope-vault - client-side field encryption for budget records
//!
//! Documents are encrypted field by field before they reach a record store:
//! strings with AES-256-GCM, numbers, booleans and dates with a reversible
//! integer cipher, so encrypted documents keep their shape.
//!
//! # Architecture
//!
//! - `crypto`: secret hashing, the numeric cipher and string sealing
//! - `document`: the value tree and the recursive document encryptor
//! - `session`: password unlock, secret recovery and store migration
//! - `storage`: JSON file storage with atomic writes
//! - `config`: path resolution and settings
//! - `cli`: command handlers for the `envelope-vault` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use envelope_vault::crypto::create_hash;
//! use envelope_vault::document::{DocumentEncryptor, EncryptionVersion, Value};
//!
//! let encryptor = DocumentEncryptor::with_hash(&create_hash("pw"), EncryptionVersion::default())?;
//! let sealed = encryptor.encrypt(Value::map([("payee", Value::from("Landlord"))]))?;
//! ```

pub mod cli;
pub mod config;
pub mod crypto;
pub mod document;
pub mod error;
pub mod session;
pub mod storage;

pub use error::{VaultError, VaultResult};
