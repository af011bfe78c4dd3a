//! One-shot cipher commands
//!
//! `hash`, `encrypt`, `decrypt` and `numeric` work on a single value or JSON
//! document and never touch the record stores.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use clap::{Args, Subcommand, ValueEnum};

use super::{print_json, read_password, resolve_secret, CliContext};
use crate::crypto::{create_hash, NumericEncryptor, Scalar};
use crate::document::{DecryptOptions, DocumentEncryptor, EncryptOptions, EncryptionVersion, Value};
use crate::error::{VaultError, VaultResult};
use crate::storage::read_json_input;

/// Where the secret comes from when no session is unlocked
#[derive(Args, Debug, Clone, Default)]
pub struct SecretArgs {
    /// Secret hash (64 hex digits) to use instead of a password prompt
    #[arg(long, env = "ENVELOPE_VAULT_HASH", hide_env_values = true)]
    pub hash: Option<String>,
}

#[derive(Args, Debug)]
pub struct HashArgs {
    /// Read the password from the first line of stdin
    #[arg(long)]
    pub password_stdin: bool,
}

#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// JSON document to encrypt, `-` for stdin
    #[arg(default_value = "-")]
    pub input: String,

    /// Field to leave in plaintext at any depth (repeatable)
    #[arg(long = "ignore", value_name = "KEY")]
    pub ignore: Vec<String>,

    /// Maps nested deeper than this are left in plaintext
    #[arg(long, allow_negative_numbers = true)]
    pub max_depth: Option<i64>,

    /// Key version to stamp (defaults to the configured one)
    #[arg(long)]
    pub key_version: Option<EncryptionVersion>,

    #[command(flatten)]
    pub secret: SecretArgs,
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// JSON document to decrypt, `-` for stdin
    #[arg(default_value = "-")]
    pub input: String,

    /// Field that was left in plaintext (repeatable)
    #[arg(long = "ignore", value_name = "KEY")]
    pub ignore: Vec<String>,

    /// Key version the secret belongs to (defaults to the configured one)
    #[arg(long)]
    pub key_version: Option<EncryptionVersion>,

    #[command(flatten)]
    pub secret: SecretArgs,
}

/// How to read a plaintext value for the numeric cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScalarKind {
    /// Boolean, then integer, then float, then date
    Auto,
    Int,
    Float,
    Bool,
    /// RFC 3339 timestamp or YYYY-MM-DD (UTC midnight)
    Date,
}

#[derive(Subcommand, Debug)]
pub enum NumericCommands {
    /// Encrypt a number, boolean or date to an integer
    Encrypt {
        #[arg(allow_hyphen_values = true)]
        value: String,

        #[arg(long, value_enum, default_value_t = ScalarKind::Auto)]
        kind: ScalarKind,

        #[command(flatten)]
        secret: SecretArgs,
    },

    /// Decrypt an integer produced by `numeric encrypt`
    Decrypt {
        #[arg(allow_negative_numbers = true)]
        ciphertext: i64,

        #[command(flatten)]
        secret: SecretArgs,
    },
}

/// Print the secret hash of a password
pub fn handle_hash_command(args: HashArgs) -> VaultResult<()> {
    let password = read_password(args.password_stdin)?;
    println!("{}", create_hash(&password).hex());
    Ok(())
}

pub fn handle_encrypt_command(ctx: &CliContext, args: EncryptArgs) -> VaultResult<()> {
    let hash = resolve_secret(ctx, &args.secret)?;
    let version = args
        .key_version
        .unwrap_or_else(|| ctx.settings.encryption.current_version.clone());
    let encryptor = DocumentEncryptor::with_hash(&hash, version)?;

    let mut options = EncryptOptions::new();
    for key in args.ignore {
        options = options.ignore(key);
    }
    if let Some(depth) = args.max_depth {
        options = options.max_depth(depth);
    }

    let document: Value = read_json_input(&args.input)?;
    print_json(&encryptor.encrypt_with(document, &options)?)
}

pub fn handle_decrypt_command(ctx: &CliContext, args: DecryptArgs) -> VaultResult<()> {
    let hash = resolve_secret(ctx, &args.secret)?;
    let version = args
        .key_version
        .unwrap_or_else(|| ctx.settings.encryption.current_version.clone());
    let encryptor = DocumentEncryptor::with_hash(&hash, version)?;

    let mut options = DecryptOptions::new();
    for key in args.ignore {
        options = options.ignore(key);
    }

    let document: Value = read_json_input(&args.input)?;
    print_json(&encryptor.decrypt_with(document, &options, |node| node)?)
}

pub fn handle_numeric_command(ctx: &CliContext, cmd: NumericCommands) -> VaultResult<()> {
    match cmd {
        NumericCommands::Encrypt { value, kind, secret } => {
            let hash = resolve_secret(ctx, &secret)?;
            let cipher = NumericEncryptor::new(hash.hex())?;
            println!("{}", cipher.encrypt(parse_scalar(&value, kind)?)?);
        }
        NumericCommands::Decrypt { ciphertext, secret } => {
            let hash = resolve_secret(ctx, &secret)?;
            let cipher = NumericEncryptor::new(hash.hex())?;
            println!("{}", format_scalar(cipher.decrypt(ciphertext)?));
        }
    }
    Ok(())
}

fn parse_scalar(raw: &str, kind: ScalarKind) -> VaultResult<Scalar> {
    let unsupported = || VaultError::UnsupportedValueType(format!("cannot read '{}' as {:?}", raw, kind));

    match kind {
        ScalarKind::Int => raw.parse::<i64>().map(Scalar::Int).map_err(|_| unsupported()),
        ScalarKind::Float => raw.parse::<f64>().map(Scalar::Float).map_err(|_| unsupported()),
        ScalarKind::Bool => match raw {
            "true" => Ok(Scalar::Bool(true)),
            "false" => Ok(Scalar::Bool(false)),
            _ => Err(unsupported()),
        },
        ScalarKind::Date => parse_date(raw).map(Scalar::Date).ok_or_else(unsupported),
        ScalarKind::Auto => [ScalarKind::Bool, ScalarKind::Int, ScalarKind::Float, ScalarKind::Date]
            .into_iter()
            .find_map(|kind| parse_scalar(raw, kind).ok())
            .ok_or_else(unsupported),
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn format_scalar(value: Scalar) -> String {
    match value {
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_scalar_auto() {
        assert_eq!(parse_scalar("true", ScalarKind::Auto).unwrap(), Scalar::Bool(true));
        assert_eq!(parse_scalar("-42", ScalarKind::Auto).unwrap(), Scalar::Int(-42));
        assert_eq!(parse_scalar("12.5", ScalarKind::Auto).unwrap(), Scalar::Float(12.5));
        assert_eq!(
            parse_scalar("2023-10-01", ScalarKind::Auto).unwrap(),
            Scalar::Date(Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap())
        );
        assert!(parse_scalar("rent", ScalarKind::Auto).is_err());
    }

    #[test]
    fn test_parse_scalar_explicit_kind() {
        assert_eq!(parse_scalar("7", ScalarKind::Float).unwrap(), Scalar::Float(7.0));
        assert!(parse_scalar("7", ScalarKind::Bool).is_err());
        assert_eq!(
            parse_scalar("2024-02-29T10:30:00+02:00", ScalarKind::Date).unwrap(),
            Scalar::Date(Utc.with_ymd_and_hms(2024, 2, 29, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_format_scalar() {
        assert_eq!(format_scalar(Scalar::Int(5)), "5");
        assert_eq!(format_scalar(Scalar::Bool(false)), "false");
        assert_eq!(
            format_scalar(Scalar::Date(Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap())),
            "2023-10-01T00:00:00.000Z"
        );
    }
}
