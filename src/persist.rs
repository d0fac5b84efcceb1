//! Atomic JSON file persistence.
//!
//! Every backing file (session histories, the session registry, the
//! document manifest, the index snapshot) goes through [`write_json`],
//! and the dotenv file through [`write_atomic`]:
//! the new content is written to a sibling `*.tmp` file, synced, and
//! renamed over the target, so a reader never observes a truncated file.
//! Output is UTF-8 with four-space indentation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use docchat_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

/// Serialize `value` as indented JSON.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser)?;
    Ok(out)
}

/// Atomically replace the file at `path` with `value` as JSON.
///
/// On failure the previous content of `path` is left untouched.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = to_pretty_json(value)
        .map_err(|e| Error::persistence(path, std::io::Error::new(ErrorKind::InvalidData, e)))?;
    write_atomic(path, &bytes).await
}

/// Atomically replace the file at `path` with `bytes`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::persistence(parent, e))?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = write_synced(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::persistence(path, e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::persistence(path, e));
    }
    Ok(())
}

/// Read and parse a JSON file. Returns `Ok(None)` if it does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::persistence(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| Error::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
