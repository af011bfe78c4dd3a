//! Encryption versions
//!
//! A version names the key a node was encrypted under. It is written into the
//! reserved `encrypted` field of every encrypted node and looked up by its
//! string form, so `2` and `"2"` name the same key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::error::VaultError;

/// Identifier of a derived key generation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EncryptionVersion {
    Flag(bool),
    Number(i64),
    Label(String),
}

impl EncryptionVersion {
    /// Map key under which the version's key is stored
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// The value stamped into the `encrypted` field
    pub fn to_value(&self) -> Value {
        match self {
            Self::Flag(b) => Value::Bool(*b),
            Self::Number(n) => Value::Int(*n),
            Self::Label(s) => Value::Str(s.clone()),
        }
    }

    /// Read a version back from an `encrypted` field
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Self::Flag(*b)),
            Value::Int(n) => Some(Self::Number(*n)),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(Self::Number(*f as i64)),
            Value::Str(s) => Some(Self::Label(s.clone())),
            _ => None,
        }
    }

    /// `false` is the opt-out marker and cannot name a key
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Flag(false))
    }
}

impl Default for EncryptionVersion {
    fn default() -> Self {
        Self::Flag(true)
    }
}

impl fmt::Display for EncryptionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Label(s) => write!(f, "{}", s),
        }
    }
}

/// `true` and integers parse to their own variants; anything else is a label
impl FromStr for EncryptionVersion {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let version = match s {
            "" => return Err(VaultError::InvalidVersion("empty".into())),
            "true" => Self::Flag(true),
            "false" => Self::Flag(false),
            other => match other.parse::<i64>() {
                Ok(n) => Self::Number(n),
                Err(_) => Self::Label(other.to_string()),
            },
        };
        if version.is_reserved() {
            return Err(VaultError::InvalidVersion(s.to_string()));
        }
        Ok(version)
    }
}

impl From<bool> for EncryptionVersion {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<i64> for EncryptionVersion {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for EncryptionVersion {
    fn from(value: &str) -> Self {
        Self::Label(value.to_string())
    }
}
