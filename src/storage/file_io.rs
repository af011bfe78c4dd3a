//! JSON file helpers with atomic writes
//!
//! A file is either fully rewritten or left as it was; partial writes never
//! replace the previous contents.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{VaultError, VaultResult};

/// Read JSON from a file, falling back to the default when it does not exist
pub fn read_json<T, P>(path: P) -> VaultResult<T>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    let file = File::open(path)
        .map_err(|e| VaultError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| VaultError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Read a JSON document from a file or, for `-`, from stdin
pub fn read_json_input<T: DeserializeOwned>(source: &str) -> VaultResult<T> {
    if source == "-" {
        let stdin = std::io::stdin();
        return serde_json::from_reader(stdin.lock())
            .map_err(|e| VaultError::Json(format!("Failed to parse stdin: {}", e)));
    }

    let path = Path::new(source);
    let file = File::open(path)
        .map_err(|e| VaultError::Io(format!("Failed to open {}: {}", path.display(), e)))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| VaultError::Json(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (temp file in the same directory, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> VaultResult<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    write_atomic(path.as_ref(), data, false)
}

/// Like [`write_json_atomic`], but readable by the owner only (0600 on Unix)
pub fn write_json_private<T, P>(path: P, data: &T) -> VaultResult<()>
where
    T: Serialize + ?Sized,
    P: AsRef<Path>,
{
    write_atomic(path.as_ref(), data, true)
}

fn write_atomic<T: Serialize + ?Sized>(path: &Path, data: &T, private: bool) -> VaultResult<()> {

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            VaultError::Storage(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Same directory, or the rename is not atomic
    let temp_path = path.with_extension("json.tmp");

    let file = create_temp(&temp_path, private)
        .map_err(|e| VaultError::Storage(format!("Failed to create temp file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| VaultError::Storage(format!("Failed to serialize data: {}", e)))?;

    writer
        .flush()
        .map_err(|e| VaultError::Storage(format!("Failed to flush data: {}", e)))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| VaultError::Storage(format!("Failed to sync data: {}", e)))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        VaultError::Storage(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

fn create_temp(path: &Path, private: bool) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;

        // mode only applies to newly created files
        if path.exists() {
            fs::remove_file(path)?;
        }
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    options.open(path)
}
