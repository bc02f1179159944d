//! Shared test utilities for station sync tests

use crate::app::adapters::http::HttpResponse;
use crate::app::adapters::http::testing::ScriptedTransport;
use crate::app::models::{DataFileCursor, Observation, StationKey};
use crate::app::services::property_match::MatchRule;
use crate::app::services::resumable_fetcher::ResumableFetcher;
use crate::app::services::station_sync::{ParsedData, ProviderAdapter, StationSync};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod data_sync_tests;

pub const SOURCE_URL: &str = "http://source.example/alpha.csv";
pub const STORE_URL: &str = "http://sta.example/v1.1";

pub const HEADER_LINE: &str = "time,temp,humidity\n";
pub const FIRST_ROWS: &str = "2020-01-01T00:00:00Z,1.5,80\n2020-01-01T01:00:00Z,1.0,82\n";
pub const NEXT_ROWS: &str = "2020-01-02T00:00:00Z,2.5,70\n";

/// Adapter over a fixed metadata mapping and a minimal CSV dialect
///
/// The first line of a full file names the columns; the first column is an
/// RFC 3339 timestamp and every other column one numeric property.
pub struct CsvAdapter {
    pub metadata: Map<String, Value>,
    pub metadata_calls: AtomicUsize,
}

impl CsvAdapter {
    pub fn new(metadata: Value) -> Self {
        Self {
            metadata: metadata.as_object().cloned().unwrap(),
            metadata_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for CsvAdapter {
    async fn fetch_metadata(&self, _key: &StationKey) -> Result<Map<String, Value>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.metadata.clone())
    }

    fn parse_data(
        &self,
        cursor: &DataFileCursor,
        body: &[u8],
        full_file: bool,
    ) -> Result<ParsedData> {
        let malformed = |message: String| Error::malformed_source_data(&cursor.filename, message);
        let text = std::str::from_utf8(body).map_err(|e| malformed(e.to_string()))?;
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let headers: Vec<String> = if full_file {
            let first = lines.next().ok_or_else(|| malformed("empty file".to_string()))?;
            first.split(',').map(str::to_string).collect()
        } else if cursor.parsed_column_headers.is_empty() {
            return Err(malformed("no column headers for a partial body".to_string()));
        } else {
            cursor.parsed_column_headers.clone()
        };

        let mut observations = Vec::new();
        for line in lines {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != headers.len() {
                return Err(malformed(format!("bad row '{}'", line)));
            }
            let timestamp = DateTime::parse_from_rfc3339(fields[0])
                .map_err(|e| malformed(e.to_string()))?
                .with_timezone(&Utc);
            for (property, field) in headers.iter().zip(&fields).skip(1) {
                let value: f64 = field.parse().map_err(|_| malformed(format!("bad value '{}'", field)))?;
                observations.push(Observation::new(timestamp, value, property.clone(), ""));
            }
        }

        Ok(ParsedData {
            observations,
            column_headers: full_file.then_some(headers),
        })
    }
}

pub fn station_key() -> StationKey {
    StationKey::new("test-provider", "ALPHA").unwrap()
}

/// Provider metadata with two datastreams and one tracked file
pub fn provider_metadata() -> Value {
    json!({
        "name": "Alpha Ridge",
        "description": "Ridge weather station",
        "latitude": 51.5,
        "longitude": "-1.25",
        "datastreams": [
            {"name": "temp", "units": "C", "type": "float", "description": "Air temperature"},
            {"name": "humidity", "units": "%", "type": "float"}
        ],
        "data_files": [{"url": SOURCE_URL, "filename": "alpha.csv"}]
    })
}

/// Station sync over a fresh scripted transport
pub fn open_sync(root: &Path) -> (Arc<ScriptedTransport>, StationSync) {
    let transport = Arc::new(ScriptedTransport::new());
    let fetcher = ResumableFetcher::new(transport.clone());
    let sync = StationSync::open(root, station_key(), fetcher, MatchRule::Exact).unwrap();
    (transport, sync)
}

pub fn head_response(length: usize) -> HttpResponse {
    HttpResponse::new(200).with_header("Content-Length", length.to_string())
}

/// Empty filtered-read answer
pub fn no_match() -> HttpResponse {
    HttpResponse::new(200).with_json(&json!({"value": []}))
}

/// Creation answer carrying identifiers
pub fn created(collection: &str, id: i64) -> HttpResponse {
    HttpResponse::new(201).with_json(&json!({
        "@iot.id": id,
        "@iot.selfLink": format!("{}/{}({})", STORE_URL, collection, id)
    }))
}
