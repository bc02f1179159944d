//! Shared test utilities and fixtures for metadata store tests

use crate::app::models::StationKey;
use crate::app::services::metadata_store::MetadataStore;
use serde_json::{Map, Value, json};
use std::path::Path;

pub mod persistence_tests;

pub fn test_key() -> StationKey {
    StationKey::new("test-provider", "STATION1").unwrap()
}

pub fn open_store(root: &Path) -> MetadataStore {
    MetadataStore::open(root, &test_key()).unwrap()
}

/// JSON object literal as a map
pub fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// Station metadata as a provider adapter would first report it
pub fn sample_metadata() -> Map<String, Value> {
    object(json!({
        "name": "Alpha Ridge",
        "description": "Hilltop weather station",
        "latitude": 51.5,
        "longitude": -0.12,
        "datastreams": [
            {"name": "temp", "units": "C", "type": "float"},
            {"name": "humidity", "units": "%", "type": "float"}
        ],
        "data_files": [
            {"url": "http://source/alpha.csv", "filename": "alpha.csv"}
        ]
    }))
}
