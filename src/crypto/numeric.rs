//! Reversible obfuscation of numbers, booleans and dates
//!
//! Each value is packed into a tagged integer (`payload << 2 | tag`) and run
//! through a per-secret affine map `encoded * multiplier + offset`. The result
//! is a plain integer that a remote store can keep and compare like any other
//! number, but that is not the plaintext.
//!
//! The map must keep producing the same ciphertexts for integers, floats and
//! dates under a given secret, otherwise records already written become
//! unreadable.

use std::sync::atomic::{AtomicU64, Ordering};

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::OsRng;
use chrono::{DateTime, Utc};

use crate::error::{VaultError, VaultResult};

use super::hash::HASH_HEX_LEN;

/// Largest integer every consumer of the ciphertexts can represent exactly (2^53 - 1)
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

const TAG_BITS: u32 = 2;
const TAG_MASK: i64 = 0b11;
const OFFSET_MODULUS: f64 = 65536.0;
const MULTIPLIER_MODULUS: f64 = 16.0;
const MAX_OFFSET: i64 = 65535;
const MAX_MULTIPLIER: i64 = 16;
const FLOAT_SCALE: f64 = 1000.0;
const BOOLEAN_POSITIONS: u64 = 31;
const BOOLEAN_POSITION_SHIFT: u32 = 32;

/// Largest integer plaintext that cannot overflow under any secret
pub const MAX_SAFE_PLAINTEXT: i64 = ((MAX_SAFE_INTEGER - MAX_OFFSET) / MAX_MULTIPLIER) >> TAG_BITS;

/// A value the numeric cipher can carry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    /// Stored as fixed point with three decimal digits
    Float(f64),
    Bool(bool),
    /// Stored as epoch milliseconds
    Date(DateTime<Utc>),
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

/// Type tag stored in the two low bits of an encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Integer = 0,
    Float = 1,
    Boolean = 2,
    Date = 3,
}

impl Tag {
    fn from_bits(bits: i64) -> Option<Self> {
        match bits {
            0 => Some(Self::Integer),
            1 => Some(Self::Float),
            2 => Some(Self::Boolean),
            3 => Some(Self::Date),
            _ => None,
        }
    }
}

/// Per-secret affine cipher over tagged integers
///
/// Boolean encryption draws on a rotating bit position, so the same boolean
/// never encrypts to the same integer twice in a row. The cursor behind it
/// lives only in memory: a freshly constructed encryptor always restarts at
/// the secret's offset, so sequences of boolean ciphertexts can repeat across
/// process restarts.
#[derive(Debug)]
pub struct NumericEncryptor {
    offset: i64,
    multiplier: i64,
    boolean_cursor: AtomicU64,
}

impl NumericEncryptor {
    /// Build the cipher from a 64-character hex secret
    pub fn new(secret_hex: &str) -> VaultResult<Self> {
        if secret_hex.len() != HASH_HEX_LEN {
            return Err(VaultError::InvalidSecret(format!(
                "expected {} hex characters, got {}",
                HASH_HEX_LEN,
                secret_hex.len()
            )));
        }

        let offset = (read_segment(secret_hex, 0)? % OFFSET_MODULUS) as i64;
        let multiplier = (read_segment(secret_hex, 16)? % MULTIPLIER_MODULUS) as i64 + 1;

        Ok(Self {
            offset,
            multiplier,
            boolean_cursor: AtomicU64::new(offset as u64),
        })
    }

    /// Additive constant of the affine map (0..=65535)
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Multiplicative constant of the affine map (1..=16)
    pub fn multiplier(&self) -> i64 {
        self.multiplier
    }

    /// Encrypt a scalar into a safe integer
    pub fn encrypt(&self, value: Scalar) -> VaultResult<i64> {
        let encoded = match value {
            Scalar::Int(v) => tagged(v, Tag::Integer)?,
            Scalar::Float(v) => tagged(fixed_point(v)?, Tag::Float)?,
            Scalar::Date(v) => tagged(v.timestamp_millis(), Tag::Date)?,
            Scalar::Bool(v) => tagged(self.boolean_payload(v), Tag::Boolean)?,
        };

        encoded
            .checked_mul(self.multiplier)
            .and_then(|scaled| scaled.checked_add(self.offset))
            .filter(|ciphertext| (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(ciphertext))
            .ok_or_else(|| {
                VaultError::EncryptedValueOverflow(format!(
                    "{:?} does not fit below {}",
                    value, MAX_SAFE_INTEGER
                ))
            })
    }

    /// Decrypt a safe integer back into the scalar it was made from
    pub fn decrypt(&self, ciphertext: i64) -> VaultResult<Scalar> {
        let shifted = ciphertext
            .checked_sub(self.offset)
            .ok_or_else(|| VaultError::CorruptCiphertext(ciphertext.to_string()))?;

        if shifted % self.multiplier != 0 {
            return Err(VaultError::CorruptCiphertext(format!(
                "{} is not produced by this secret",
                ciphertext
            )));
        }

        let encoded = shifted / self.multiplier;
        let payload = encoded >> TAG_BITS;

        match Tag::from_bits(encoded & TAG_MASK) {
            Some(Tag::Integer) => Ok(Scalar::Int(payload)),
            Some(Tag::Float) => Ok(Scalar::Float(payload as f64 / FLOAT_SCALE)),
            Some(Tag::Date) => DateTime::<Utc>::from_timestamp_millis(payload)
                .map(Scalar::Date)
                .ok_or(VaultError::InvalidTag(ciphertext)),
            Some(Tag::Boolean) => {
                if payload < 0 {
                    return Err(VaultError::InvalidTag(ciphertext));
                }
                // Shift the whole payload (position bits included) by the
                // position itself; existing ciphertexts depend on this order.
                let position = payload >> BOOLEAN_POSITION_SHIFT;
                let bit = u32::try_from(position)
                    .ok()
                    .and_then(|position| payload.checked_shr(position))
                    .ok_or(VaultError::InvalidTag(ciphertext))?;
                Ok(Scalar::Bool(bit & 1 == 1))
            }
            None => Err(VaultError::InvalidTag(ciphertext)),
        }
    }

    /// Pack a boolean into 32 bits of noise plus the bit position carrying it
    fn boolean_payload(&self, value: bool) -> i64 {
        let noise = OsRng.next_u32() as i64;
        let position = (self.boolean_cursor.fetch_add(1, Ordering::Relaxed) % BOOLEAN_POSITIONS) as i64;

        let noise = if value {
            noise | (1 << position)
        } else {
            noise & !(1 << position)
        };

        (position << BOOLEAN_POSITION_SHIFT) | noise
    }
}

/// Read 16 hex digits as an IEEE-754 double
///
/// Records in the wild were written by a client that parsed these segments
/// into doubles, so digits past 2^53 are rounded before the modulo.
fn read_segment(secret_hex: &str, start: usize) -> VaultResult<f64> {
    let segment = secret_hex
        .get(start..start + 16)
        .ok_or_else(|| VaultError::InvalidSecret("secret is not ASCII hex".into()))?;

    u64::from_str_radix(segment, 16)
        .map(|digits| digits as f64)
        .map_err(|e| VaultError::InvalidSecret(format!("not a hex string: {}", e)))
}

fn tagged(payload: i64, tag: Tag) -> VaultResult<i64> {
    payload
        .checked_mul(1 << TAG_BITS)
        .map(|shifted| shifted | tag as i64)
        .ok_or_else(|| VaultError::EncryptedValueOverflow(format!("payload {} is too large", payload)))
}

fn fixed_point(value: f64) -> VaultResult<i64> {
    if !value.is_finite() {
        return Err(VaultError::UnsupportedValueType(format!(
            "non-finite number {}",
            value
        )));
    }

    let scaled = (value * FLOAT_SCALE).trunc();
    if scaled.abs() > MAX_SAFE_INTEGER as f64 {
        return Err(VaultError::EncryptedValueOverflow(format!(
            "{} exceeds fixed-point range",
            value
        )));
    }

    Ok(scaled as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Hex digit i is i % 16
    fn reference_secret() -> String {
        "0123456789abcdef".repeat(4)
    }

    /// Largest possible offset and multiplier
    fn worst_case_secret() -> String {
        format!("{}{}{}", "000000000000ffff", "000000000000000f", "0".repeat(32))
    }

    fn reference() -> NumericEncryptor {
        NumericEncryptor::new(&reference_secret()).unwrap()
    }

    fn boolean_ciphertext(enc: &NumericEncryptor, position: i64, noise: i64) -> i64 {
        let payload = (position << 32) | noise;
        ((payload << 2) | Tag::Boolean as i64) * enc.multiplier() + enc.offset()
    }

    #[test]
    fn test_rejects_short_secret() {
        assert!(matches!(
            NumericEncryptor::new("abc"),
            Err(VaultError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_reference_constants() {
        let enc = reference();
        assert_eq!(enc.offset(), 52720);
        assert_eq!(enc.multiplier(), 1);
    }

    #[test]
    fn test_worst_case_constants() {
        let enc = NumericEncryptor::new(&worst_case_secret()).unwrap();
        assert_eq!(enc.offset(), MAX_OFFSET);
        assert_eq!(enc.multiplier(), MAX_MULTIPLIER);
    }

    #[test]
    fn test_reference_date_vector() {
        let enc = reference();
        let date = Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap();
        assert_eq!(enc.encrypt(Scalar::Date(date)).unwrap(), 6784473652723);
        assert_eq!(enc.decrypt(6784473652723).unwrap(), Scalar::Date(date));
    }

    #[test]
    fn test_reference_float_vector() {
        let enc = reference();
        assert_eq!(enc.encrypt(Scalar::Float(5436.3466)).unwrap(), 21798105);
        assert_eq!(enc.decrypt(21798105).unwrap(), Scalar::Float(5436.346));
    }

    #[test]
    fn test_reference_boolean_vector() {
        let enc = reference();
        assert_eq!(enc.decrypt(98263021426).unwrap(), Scalar::Bool(true));
    }

    #[test]
    fn test_integer_round_trip() {
        let enc = reference();
        for value in [0, 1, -1, 42, -9000, 1_000_000_007, MAX_SAFE_PLAINTEXT] {
            let ciphertext = enc.encrypt(Scalar::Int(value)).unwrap();
            assert_eq!(enc.decrypt(ciphertext).unwrap(), Scalar::Int(value));
        }
    }

    #[test]
    fn test_float_round_trip_truncates_to_three_digits() {
        let enc = NumericEncryptor::new(&worst_case_secret()).unwrap();
        for (input, expected) in [(1.5, 1.5), (-2.25, -2.25), (3.14159, 3.141), (-0.0009, 0.0)] {
            let ciphertext = enc.encrypt(Scalar::Float(input)).unwrap();
            assert_eq!(enc.decrypt(ciphertext).unwrap(), Scalar::Float(expected));
        }
    }

    #[test]
    fn test_date_round_trip() {
        let enc = NumericEncryptor::new(&worst_case_secret()).unwrap();
        let date = Utc.with_ymd_and_hms(1969, 7, 20, 20, 17, 40).unwrap();
        let ciphertext = enc.encrypt(date.into()).unwrap();
        assert_eq!(enc.decrypt(ciphertext).unwrap(), Scalar::Date(date));
    }

    #[test]
    fn test_boolean_encryption_never_repeats_consecutively() {
        let enc = reference();
        for value in [true, false] {
            let mut previous = enc.encrypt(Scalar::Bool(value)).unwrap();
            for _ in 0..100 {
                let next = enc.encrypt(Scalar::Bool(value)).unwrap();
                assert_ne!(previous, next);
                assert_eq!(enc.decrypt(next).unwrap(), Scalar::Bool(value));
                previous = next;
            }
        }
    }

    #[test]
    fn test_boolean_cursor_starts_at_offset() {
        let enc = reference();
        // 52720 % 31 == 20
        let ciphertext = enc.encrypt(Scalar::Bool(true)).unwrap();
        let payload = (ciphertext - enc.offset()) / enc.multiplier() >> 2;
        assert_eq!(payload >> 32, 20);
    }

    #[test]
    fn test_boolean_decode_at_boundary_positions() {
        let enc = NumericEncryptor::new(&worst_case_secret()).unwrap();
        for position in [0i64, 15, 30] {
            let set = boolean_ciphertext(&enc, position, 0x5555_5555 | (1 << position));
            let clear = boolean_ciphertext(&enc, position, 0x5555_5555 & !(1 << position));
            assert_eq!(enc.decrypt(set).unwrap(), Scalar::Bool(true), "position {}", position);
            assert_eq!(enc.decrypt(clear).unwrap(), Scalar::Bool(false), "position {}", position);
        }
    }

    #[test]
    fn test_max_safe_plaintext_bound() {
        let enc = NumericEncryptor::new(&worst_case_secret()).unwrap();
        assert_eq!(
            enc.encrypt(Scalar::Int(MAX_SAFE_PLAINTEXT)).unwrap(),
            MAX_SAFE_INTEGER
        );
        assert!(matches!(
            enc.encrypt(Scalar::Int(MAX_SAFE_PLAINTEXT + 1)),
            Err(VaultError::EncryptedValueOverflow(_))
        ));
    }

    #[test]
    fn test_max_safe_plaintext_fits_any_secret() {
        for secret in [reference_secret(), worst_case_secret(), "f".repeat(64)] {
            let enc = NumericEncryptor::new(&secret).unwrap();
            assert!(enc.encrypt(Scalar::Int(MAX_SAFE_PLAINTEXT)).is_ok());
        }
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let enc = reference();
        assert!(matches!(
            enc.encrypt(Scalar::Float(f64::NAN)),
            Err(VaultError::UnsupportedValueType(_))
        ));
        assert!(matches!(
            enc.encrypt(Scalar::Float(f64::INFINITY)),
            Err(VaultError::UnsupportedValueType(_))
        ));
    }

    #[test]
    fn test_ciphertext_from_other_secret_is_corrupt() {
        let enc = NumericEncryptor::new(&worst_case_secret()).unwrap();
        // (x - 65535) must be a multiple of 16
        assert!(matches!(
            enc.decrypt(65536),
            Err(VaultError::CorruptCiphertext(_))
        ));
    }
}
