use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

const REFERENCE_HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

/// Config directory plus a separate volatile runtime directory
struct Sandbox {
    config: TempDir,
    runtime: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            config: TempDir::new().unwrap(),
            runtime: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.config.path()
    }

    fn vault(&self) -> Command {
        let mut cmd = vault(self.config.path());
        cmd.env("ENVELOPE_VAULT_RUNTIME_DIR", self.runtime.path());
        cmd
    }
}

fn vault(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("envelope-vault").unwrap();
    cmd.env("ENVELOPE_VAULT_DATA_DIR", dir)
        .env_remove("ENVELOPE_VAULT_RUNTIME_DIR")
        .env_remove("XDG_RUNTIME_DIR")
        .env_remove("ENVELOPE_VAULT_HASH")
        .env_remove("ENVELOPE_VAULT_LOG");
    cmd
}

fn write_store(dir: &Path, name: &str, items: serde_json::Value) {
    let data = dir.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(
        data.join(format!("{}.json", name)),
        serde_json::to_string(&json!({ "items": items })).unwrap(),
    )
    .unwrap();
}

#[test]
fn hash_prints_sha256_of_password() {
    let dir = TempDir::new().unwrap();
    vault(dir.path())
        .args(["hash", "--password-stdin"])
        .write_stdin("abc\n")
        .assert()
        .success()
        .stdout("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad\n");
}

#[test]
fn numeric_matches_reference_vectors() {
    let dir = TempDir::new().unwrap();

    vault(dir.path())
        .args(["numeric", "encrypt", "5436.3466", "--kind", "float", "--hash", REFERENCE_HASH])
        .assert()
        .success()
        .stdout("21798105\n");

    vault(dir.path())
        .args(["numeric", "encrypt", "2023-10-01", "--kind", "date", "--hash", REFERENCE_HASH])
        .assert()
        .success()
        .stdout("6784473652723\n");

    vault(dir.path())
        .args(["numeric", "decrypt", "98263021426"])
        .env("ENVELOPE_VAULT_HASH", REFERENCE_HASH)
        .assert()
        .success()
        .stdout("true\n");
}

#[test]
fn numeric_rejects_bad_secret() {
    let dir = TempDir::new().unwrap();
    vault(dir.path())
        .args(["numeric", "encrypt", "5", "--hash", "not-hex"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid secret"));
}

#[test]
fn encrypt_then_decrypt_document() {
    let dir = TempDir::new().unwrap();
    let original = json!({
        "id": "txn-1",
        "payee": "Landlord",
        "amount": -120000,
        "cleared": true,
        "tags": ["rent", "monthly"]
    });
    let plain_path = dir.path().join("plain.json");
    fs::write(&plain_path, original.to_string()).unwrap();

    let output = vault(dir.path())
        .args(["encrypt", plain_path.to_str().unwrap(), "--ignore", "id", "--hash", REFERENCE_HASH])
        .output()
        .unwrap();
    assert!(output.status.success());

    let sealed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(sealed["id"], "txn-1");
    assert_eq!(sealed["encrypted"], true);
    assert_ne!(sealed["payee"], "Landlord");
    assert_ne!(sealed["amount"], -120000);

    let output = vault(dir.path())
        .args(["decrypt", "-", "--ignore", "id", "--hash", REFERENCE_HASH])
        .write_stdin(sealed.to_string())
        .output()
        .unwrap();
    assert!(output.status.success());

    let opened: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(opened, original);
}

#[test]
fn unlock_migrates_then_locks() {
    let dir = Sandbox::new();
    write_store(
        dir.path(),
        "transactions",
        json!([
            {"id": "t1", "payee": "Corner Shop", "amount": -450},
            {"id": "t2", "payee": "Employer", "amount": 250000}
        ]),
    );

    dir.vault()
        .args(["unlock", "--password-stdin"])
        .write_stdin("correct horse\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unlocked"))
        .stderr(predicate::str::contains("Migration complete"));

    let stored = fs::read_to_string(dir.path().join("data").join("transactions.json")).unwrap();
    assert!(!stored.contains("Corner Shop"));
    let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored["items"][0]["encrypted"], true);
    assert_eq!(stored["items"][0]["id"], "t1");

    dir.vault()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unlocked:        true"))
        .stdout(predicate::str::contains("Fully migrated:  true"));

    // Session secret lets decrypt run without a prompt
    let output = dir.vault()
        .args(["decrypt", "-"])
        .write_stdin(stored["items"][0].to_string())
        .output()
        .unwrap();
    assert!(output.status.success());
    let opened: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(opened, json!({"id": "t1", "payee": "Corner Shop", "amount": -450}));

    assert!(dir.runtime.path().join("session.json").exists());
    dir.vault().arg("lock").assert().success();
    assert!(!dir.runtime.path().join("session.json").exists());

    dir.vault()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unlocked:        false"));
}

#[test]
fn unlock_rejects_wrong_password() {
    let dir = Sandbox::new();

    dir.vault()
        .args(["unlock", "--password-stdin"])
        .write_stdin("correct horse\n")
        .assert()
        .success();
    dir.vault().arg("lock").assert().success();

    dir.vault()
        .args(["unlock", "--password-stdin"])
        .write_stdin("battery staple\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid password"));
}

#[test]
fn config_shows_paths_and_defaults() {
    let dir = TempDir::new().unwrap();
    vault(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains(dir.path().to_str().unwrap()))
        .stdout(predicate::str::contains("\"migration_chunk_size\": 100"));
}

fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

#[test]
fn unlock_keeps_secret_out_of_config_dir() {
    let dir = Sandbox::new();
    write_store(dir.path(), "transactions", json!([{"id": "t1", "payee": "Corner Shop"}]));

    dir.vault()
        .args(["unlock", "--password-stdin"])
        .write_stdin("correct horse\n")
        .assert()
        .success();

    let secret = dir
        .vault()
        .args(["hash", "--password-stdin"])
        .write_stdin("correct horse\n")
        .output()
        .unwrap();
    let secret = String::from_utf8(secret.stdout).unwrap();
    let secret = secret.trim();
    assert_eq!(secret.len(), 64);

    for file in files_under(dir.path()) {
        let contents = fs::read_to_string(&file).unwrap();
        assert!(!contents.contains(secret), "{} holds the secret", file.display());
    }
}

#[test]
fn unlock_without_runtime_dir_keeps_nothing() {
    let dir = TempDir::new().unwrap();

    vault(dir.path())
        .args(["unlock", "--password-stdin"])
        .write_stdin("correct horse\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("no runtime directory"));

    vault(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unlocked:        false"))
        .stdout(predicate::str::contains("Password set:    true"));
}

#[test]
fn key_version_flag_stamps_documents() {
    let dir = TempDir::new().unwrap();
    let original = json!({"id": "acct-1", "balance": 9100});

    let output = vault(dir.path())
        .args(["encrypt", "-", "--ignore", "id", "--key-version", "2", "--hash", REFERENCE_HASH])
        .write_stdin(original.to_string())
        .output()
        .unwrap();
    assert!(output.status.success());
    let sealed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(sealed["encrypted"], 2);

    let output = vault(dir.path())
        .args(["decrypt", "-", "--ignore", "id", "--key-version", "2", "--hash", REFERENCE_HASH])
        .write_stdin(sealed.to_string())
        .output()
        .unwrap();
    assert!(output.status.success());
    let opened: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(opened, original);
}
