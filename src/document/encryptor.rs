//! Recursive document encryption
//!
//! Strings are sealed with AES-256-GCM and prefixed with [`STRING_SENTINEL`];
//! numbers, booleans and dates become a single integer from the
//! [`NumericEncryptor`]; every encrypted map node is stamped with the version
//! it was encrypted under in the reserved [`ENCRYPTED_FIELD`].

use std::collections::{HashMap, HashSet};

use aes_gcm::Aes256Gcm;
use tracing::{debug, warn};

use crate::crypto::{
    cipher_from_key, open_string, seal_string, NumericEncryptor, Scalar, SecretHash,
    MAX_SAFE_INTEGER,
};
use crate::error::{VaultError, VaultResult};

use super::value::{Map, Value};
use super::version::EncryptionVersion;

/// Prefix marking an encrypted string leaf
pub const STRING_SENTINEL: &str = "$O";

/// Reserved field carrying a node's encryption version
pub const ENCRYPTED_FIELD: &str = "encrypted";

/// Key material of one version: the AES key for strings and the numeric
/// cipher derived from the same secret
struct VersionKey {
    version: EncryptionVersion,
    cipher: Aes256Gcm,
    numeric: NumericEncryptor,
}

/// Per-call controls for [`DocumentEncryptor::encrypt_with`]
#[derive(Debug, Clone, Default)]
pub struct EncryptOptions {
    ignore_keys: HashSet<String>,
    max_depth: Option<i64>,
    version: Option<EncryptionVersion>,
}

impl EncryptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass this field through unencrypted, at every level
    pub fn ignore(mut self, key: impl Into<String>) -> Self {
        self.ignore_keys.insert(key.into());
        self
    }

    /// Leave maps nested deeper than `depth` untouched
    ///
    /// Arrays carry no version marker, so they are always walked; only the
    /// maps inside them are left in plaintext.
    pub fn max_depth(mut self, depth: i64) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Encrypt under this version instead of the encryptor's current one
    pub fn version(mut self, version: EncryptionVersion) -> Self {
        self.version = Some(version);
        self
    }
}

/// Per-call controls for [`DocumentEncryptor::decrypt_with`]
#[derive(Debug, Clone, Default)]
pub struct DecryptOptions {
    ignore_keys: HashSet<String>,
}

impl DecryptOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field that was ignored on encryption and holds plaintext
    pub fn ignore(mut self, key: impl Into<String>) -> Self {
        self.ignore_keys.insert(key.into());
        self
    }
}

/// Encrypts and decrypts document trees for one unlocked session
///
/// Several key versions can be loaded at once so documents written under an
/// older key still decrypt, while new writes always use the current version.
/// Each version keeps the numeric cipher of its own secret.
pub struct DocumentEncryptor {
    keys: HashMap<String, VersionKey>,
    current: EncryptionVersion,
}

impl DocumentEncryptor {
    /// Create an encryptor with no keys loaded yet
    pub fn new(current: EncryptionVersion) -> VaultResult<Self> {
        check_version(&current)?;

        Ok(Self {
            keys: HashMap::new(),
            current,
        })
    }

    /// Create an encryptor and load `hash` as its current version
    pub fn with_hash(hash: &SecretHash, version: EncryptionVersion) -> VaultResult<Self> {
        let mut encryptor = Self::new(version.clone())?;
        encryptor.init(hash, version)?;
        Ok(encryptor)
    }

    /// Load the key derived from `hash` under `version`
    pub fn init(&mut self, hash: &SecretHash, version: EncryptionVersion) -> VaultResult<()> {
        check_version(&version)?;

        let numeric = NumericEncryptor::new(hash.hex())?;
        let cipher = cipher_from_key(hash.raw())?;

        debug!(version = %version, "loaded document key");
        self.keys.insert(
            version.key(),
            VersionKey {
                version,
                cipher,
                numeric,
            },
        );
        Ok(())
    }

    /// Version used for new writes
    pub fn current_version(&self) -> &EncryptionVersion {
        &self.current
    }

    /// Check whether a key is loaded for `version`
    pub fn has_version(&self, version: &EncryptionVersion) -> bool {
        self.keys.contains_key(&version.key())
    }

    /// All loaded versions, ordered by key
    pub fn loaded_versions(&self) -> Vec<EncryptionVersion> {
        let mut versions: Vec<_> = self.keys.values().map(|k| k.version.clone()).collect();
        versions.sort_by_key(EncryptionVersion::key);
        versions
    }

    /// Encrypt a document under the current version
    pub fn encrypt(&self, data: Value) -> VaultResult<Value> {
        self.encrypt_with(data, &EncryptOptions::default())
    }

    /// Encrypt a document
    ///
    /// A root value that encrypts to nothing (a NaN) comes back as `Null`.
    pub fn encrypt_with(&self, data: Value, options: &EncryptOptions) -> VaultResult<Value> {
        let version = options.version.as_ref().unwrap_or(&self.current);
        let pass = EncryptPass {
            key: self.key(version)?,
            ignore_keys: &options.ignore_keys,
        };

        Ok(pass.node(data, options.max_depth)?.unwrap_or(Value::Null))
    }

    /// Decrypt a document
    pub fn decrypt(&self, data: Value) -> VaultResult<Value> {
        self.decrypt_with(data, &DecryptOptions::default(), |value| value)
    }

    /// Decrypt a document, passing every decoded value through `transform`
    ///
    /// Map nodes whose version has no loaded key are returned as they are,
    /// without `transform`.
    pub fn decrypt_with<F>(&self, data: Value, options: &DecryptOptions, transform: F) -> VaultResult<Value>
    where
        F: Fn(Value) -> Value,
    {
        let pass = DecryptPass {
            keys: &self.keys,
            ignore_keys: &options.ignore_keys,
            transform: &transform,
        };

        pass.node(data, self.keys.get(&self.current.key()))
    }

    /// Seal a string under the current version (no sentinel)
    pub fn encrypt_string(&self, plaintext: &str) -> VaultResult<String> {
        seal_string(plaintext, &self.key(&self.current)?.cipher)
    }

    /// Open a string sealed under the current version
    ///
    /// Failures are logged and the input is returned unchanged.
    pub fn decrypt_string(&self, wire: &str) -> String {
        let opened = self
            .key(&self.current)
            .and_then(|key| open_string(wire, &key.cipher));

        match opened {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(error = %e, "failed to decrypt string");
                wire.to_string()
            }
        }
    }

    fn key(&self, version: &EncryptionVersion) -> VaultResult<&VersionKey> {
        self.keys
            .get(&version.key())
            .ok_or_else(|| VaultError::KeyUnavailable(version.to_string()))
    }
}

fn check_version(version: &EncryptionVersion) -> VaultResult<()> {
    if version.is_reserved() {
        return Err(VaultError::InvalidVersion(format!(
            "'{}' marks unencrypted subtrees",
            version
        )));
    }
    Ok(())
}

struct EncryptPass<'a> {
    key: &'a VersionKey,
    ignore_keys: &'a HashSet<String>,
}

impl EncryptPass<'_> {
    /// `None` means the value is dropped from its parent
    fn node(&self, value: Value, depth: Option<i64>) -> VaultResult<Option<Value>> {
        match value {
            Value::Null | Value::Verbatim(_) => Ok(Some(value)),
            Value::Map(_) if depth.is_some_and(|d| d < 0) => Ok(Some(value)),
            Value::Array(items) => {
                let child_depth = depth.map(|d| d.saturating_sub(1));
                let mut encrypted = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(item) = self.node(item, child_depth)? {
                        encrypted.push(item);
                    }
                }
                Ok(Some(Value::Array(encrypted)))
            }
            Value::Map(map) => self.map(map, depth).map(Some),
            Value::Float(f) if f.is_nan() => Ok(None),
            Value::Int(i) => self.scalar(Scalar::Int(i)),
            Value::Float(f) => self.scalar(Scalar::Float(f)),
            Value::Bool(b) => self.scalar(Scalar::Bool(b)),
            Value::Date(d) => self.scalar(Scalar::Date(d)),
            Value::Str(s) => {
                let sealed = seal_string(&s, &self.key.cipher)?;
                Ok(Some(Value::Str(format!("{}{}", STRING_SENTINEL, sealed))))
            }
        }
    }

    fn scalar(&self, scalar: Scalar) -> VaultResult<Option<Value>> {
        self.key.numeric.encrypt(scalar).map(|c| Some(Value::Int(c)))
    }

    fn map(&self, mut map: Map, depth: Option<i64>) -> VaultResult<Value> {
        match map.remove(ENCRYPTED_FIELD) {
            Some(Value::Bool(false)) => return Ok(Value::Map(map)),
            Some(existing) => {
                return Err(VaultError::ReservedKeyCollision(
                    serde_json::Value::from(existing).to_string(),
                ))
            }
            None => {}
        }

        let child_depth = depth.map(|d| d.saturating_sub(1));
        let mut encrypted = Map::new();
        for (field, value) in map {
            if self.ignore_keys.contains(&field) {
                encrypted.insert(field, value);
            } else if let Some(value) = self.node(value, child_depth)? {
                encrypted.insert(field, value);
            }
        }

        encrypted.insert(ENCRYPTED_FIELD.to_string(), self.key.version.to_value());
        Ok(Value::Map(encrypted))
    }
}

struct DecryptPass<'a> {
    keys: &'a HashMap<String, VersionKey>,
    ignore_keys: &'a HashSet<String>,
    transform: &'a dyn Fn(Value) -> Value,
}

impl DecryptPass<'_> {
    /// `key` is the key of the closest enclosing encrypted node
    fn node(&self, value: Value, key: Option<&VersionKey>) -> VaultResult<Value> {
        let decoded = match value {
            Value::Verbatim(_) => return Ok(value),
            Value::Int(ciphertext) => self.scalar(ciphertext, key)?,
            Value::Float(f) => {
                if f.fract() != 0.0 || f.abs() > MAX_SAFE_INTEGER as f64 {
                    return Err(VaultError::CorruptCiphertext(format!(
                        "{} is not an integer",
                        f
                    )));
                }
                self.scalar(f as i64, key)?
            }
            Value::Str(s) => Value::Str(self.string(s, key)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.node(item, key))
                    .collect::<VaultResult<_>>()?,
            ),
            Value::Map(mut map) => {
                let node_key = map
                    .get(ENCRYPTED_FIELD)
                    .and_then(EncryptionVersion::from_value)
                    .and_then(|version| self.keys.get(&version.key()));
                let Some(node_key) = node_key else {
                    return Ok(Value::Map(map));
                };

                map.remove(ENCRYPTED_FIELD);
                let mut decrypted = Map::new();
                for (field, value) in map {
                    let value = if self.ignore_keys.contains(&field) {
                        value
                    } else {
                        self.node(value, Some(node_key))?
                    };
                    decrypted.insert(field, value);
                }
                Value::Map(decrypted)
            }
            Value::Null | Value::Bool(_) | Value::Date(_) => value,
        };

        Ok((self.transform)(decoded))
    }

    fn scalar(&self, ciphertext: i64, key: Option<&VersionKey>) -> VaultResult<Value> {
        let key = key.ok_or_else(|| VaultError::KeyUnavailable("numeric".to_string()))?;
        Ok(key.numeric.decrypt(ciphertext)?.into())
    }

    /// One bad field must not abort the whole document: failures keep the ciphertext
    fn string(&self, leaf: String, key: Option<&VersionKey>) -> String {
        if !leaf.starts_with(STRING_SENTINEL) {
            return leaf;
        }

        let Some(key) = key else {
            warn!("no key loaded for encrypted string, leaving ciphertext in place");
            return leaf;
        };

        match open_string(&leaf[STRING_SENTINEL.len()..], &key.cipher) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(version = %key.version, error = %e, "failed to decrypt string field");
                leaf
            }
        }
    }
}
