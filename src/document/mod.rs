//! Document-level encryption
//!
//! Walks a [`Value`] tree and encrypts every leaf, stamping each map node
//! with the key version it was written under.

pub mod encryptor;
pub mod value;
pub mod version;

pub use encryptor::{
    DecryptOptions, DocumentEncryptor, EncryptOptions, ENCRYPTED_FIELD, STRING_SENTINEL,
};
pub use value::{Map, Value};
pub use version::EncryptionVersion;
