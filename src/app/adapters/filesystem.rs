//! Filesystem access for cache envelopes
//!
//! Every cache file is a JSON `CacheRecord` envelope. Reads tolerate a
//! missing file and an outdated schema version; writes replace the file
//! atomically through a sibling temp file so readers never observe a partial
//! record.

use crate::app::models::CacheRecord;
use crate::constants::CACHE_SCHEMA_VERSION;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Read the payload of an envelope, or `None` if the file does not exist
///
/// A schema version other than the current one is logged and the payload is
/// still decoded best-effort.
pub fn read_payload<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::io(
                format!("Failed to read cache file {}", path.display()),
                e,
            ));
        }
    };

    let record: CacheRecord<Value> = serde_json::from_slice(&bytes).map_err(|e| {
        Error::serialization(
            format!("Cache file {} is not a valid envelope", path.display()),
            e,
        )
    })?;

    if !record.is_current() {
        warn!(
            "Cache schema mismatch in {}: expected version {}, found {}; reading best-effort",
            path.display(),
            CACHE_SCHEMA_VERSION,
            record.schema_version
        );
    }

    let payload = serde_json::from_value(record.payload).map_err(|e| {
        Error::serialization(
            format!("Cache file {} has an unreadable payload", path.display()),
            e,
        )
    })?;

    Ok(Some(payload))
}

/// Atomically write `payload` wrapped in a current-version envelope
///
/// Parent directories are created as needed.
pub fn write_payload<T: Serialize>(path: &Path, payload: &T) -> Result<()> {
    let bytes = encode_payload(payload)?;

    let parent = path.parent().ok_or_else(|| {
        Error::configuration(format!("Cache path {} has no parent", path.display()))
    })?;
    fs::create_dir_all(parent).map_err(|e| {
        Error::io(
            format!("Failed to create cache directory {}", parent.display()),
            e,
        )
    })?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| {
        Error::io(
            format!("Failed to create temp file in {}", parent.display()),
            e,
        )
    })?;
    temp.write_all(&bytes)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| Error::io(format!("Failed to write {}", path.display()), e))?;
    temp.persist(path).map_err(|e| {
        Error::io(
            format!("Failed to replace cache file {}", path.display()),
            e.error,
        )
    })?;

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Serialized form of a current-version envelope
///
/// Output is deterministic for deterministic payloads (ordered maps), which
/// lets callers skip rewriting unchanged files.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(&CacheRecord::current(payload))
        .map_err(|e| Error::serialization("Failed to encode cache record", e))?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let result: Option<BTreeMap<String, i32>> =
            read_payload(&temp_dir.path().join("absent.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_write_creates_parents_and_reads_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a").join("b").join("record.json");
        let mut payload = BTreeMap::new();
        payload.insert("k".to_string(), 3);

        write_payload(&path, &payload).unwrap();
        let back: BTreeMap<String, i32> = read_payload(&path).unwrap().unwrap();
        assert_eq!(back, payload);

        let raw: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["schema_version"], json!(CACHE_SCHEMA_VERSION));
    }

    #[test]
    fn test_outdated_schema_is_still_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("old.json");
        fs::write(&path, r#"{"schema_version": 0, "payload": {"k": 1}}"#).unwrap();

        let back: BTreeMap<String, i32> = read_payload(&path).unwrap().unwrap();
        assert_eq!(back.get("k"), Some(&1));
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.json");
        fs::write(&path, "not json").unwrap();

        let result: Result<Option<BTreeMap<String, i32>>> = read_payload(&path);
        assert!(matches!(result, Err(Error::Serialization { .. })));
    }
}
