//! Whole-document JSON records on disk.

use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

/// Reads and parses a record. A missing file is `Ok(None)`; a record that
/// fails to parse is an `InvalidData` error.
pub(crate) async fn read<T: DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Writes through a sibling temp file and renames it into place, so readers
/// never observe a half-written record.
pub(crate) async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");

    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await
}
