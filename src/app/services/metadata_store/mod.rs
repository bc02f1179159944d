//! Station metadata cache with additive merge semantics
//!
//! One record per station at `<provider>/<station>/metadata.json`. The store
//! holds the current [`StationMetadata`] snapshot; every mutation builds a new
//! snapshot, commits it to disk atomically and only then swaps it in, so a
//! failed write leaves both the file and the in-memory view unchanged.

use crate::app::adapters::filesystem;
use crate::app::models::{
    DataFileCursor, DatastreamDescriptor, StationKey, StationMetadata, merge_datastreams,
    upsert_cursor,
};
use crate::constants::{METADATA_FILE_NAME, metadata_keys};
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(test)]
pub mod tests;

/// Metadata cache for a single station
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    current: StationMetadata,
    span: tracing::Span,
}

impl MetadataStore {
    /// Open the store for `key`, loading any cached snapshot
    pub fn open(cache_root: &Path, key: &StationKey) -> Result<Self> {
        Self::open_with_span(cache_root, key, key.span())
    }

    /// Open the store, emitting events in the given span
    pub fn open_with_span(cache_root: &Path, key: &StationKey, span: tracing::Span) -> Result<Self> {
        let path = key.station_dir(cache_root).join(METADATA_FILE_NAME);
        let current = {
            let _entered = span.enter();
            let loaded: Option<Map<String, Value>> = filesystem::read_payload(&path)?;
            match loaded {
                Some(fields) => {
                    debug!("Loaded cached metadata from {}", path.display());
                    StationMetadata::from_map(fields)
                }
                None => {
                    debug!("No cached metadata at {}", path.display());
                    StationMetadata::new()
                }
            }
        };

        Ok(Self {
            path,
            current,
            span,
        })
    }

    /// Location of the metadata record
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot (empty if nothing is cached)
    pub fn get(&self) -> StationMetadata {
        self.current.clone()
    }

    /// Whether any metadata is cached for this station
    pub fn is_cached(&self) -> bool {
        !self.current.is_empty()
    }

    /// Replace one top-level field and persist
    pub fn set(&mut self, key: &str, value: Value) -> Result<StationMetadata> {
        let next = self.current.with_field(key, value);
        self.commit(next, &format!("set '{}'", key))
    }

    /// Deep-merge `partial` into the cached metadata and persist
    ///
    /// Nested mappings merge key by key; lists and scalars replace the cached
    /// value whole. Callers updating `datastreams` should build the merged
    /// list with [`merge_datastreams`] or use [`Self::merge_datastreams`].
    pub fn merge(&mut self, partial: &Map<String, Value>) -> Result<StationMetadata> {
        let next = self.current.merged(partial);
        let keys: Vec<&str> = partial.keys().map(String::as_str).collect();
        self.commit(next, &format!("merge [{}]", keys.join(", ")))
    }

    /// Merge incoming datastream descriptors, keeping cached remote ids
    pub fn merge_datastreams(
        &mut self,
        incoming: Vec<DatastreamDescriptor>,
    ) -> Result<StationMetadata> {
        let merged = merge_datastreams(&self.current.datastreams()?, incoming);
        let value = to_value(&merged)?;
        self.set(metadata_keys::DATASTREAMS, value)
    }

    /// Replace or append the cursor tracking `cursor.url`
    pub fn upsert_data_file(&mut self, cursor: DataFileCursor) -> Result<StationMetadata> {
        let mut cursors = self.current.data_files()?;
        upsert_cursor(&mut cursors, cursor);
        let value = to_value(&cursors)?;
        self.set(metadata_keys::DATA_FILES, value)
    }

    fn commit(&mut self, next: StationMetadata, action: &str) -> Result<StationMetadata> {
        let _entered = self.span.enter();
        filesystem::write_payload(&self.path, next.as_map())?;
        info!("Metadata committed after {}", action);
        self.current = next;
        Ok(self.current.clone())
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::serialization("Failed to encode metadata field", e))
}
