//! Data models for station synchronization
//!
//! This module contains the core data structures shared by the caches, the
//! resumable fetcher and the entity reconciler: observations, data file
//! cursors, datastream descriptors and the station metadata snapshot.

use crate::constants::{self, metadata_keys};
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

// =============================================================================
// Station Identity
// =============================================================================

/// Identifies one station's keyspace in the cache
///
/// The cache is laid out per provider, then per station, and assumes a single
/// writer per station.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationKey {
    /// Provider (source family) name, e.g. "wunderground"
    pub provider: String,

    /// Station identifier within the provider
    pub station: String,
}

impl StationKey {
    /// Create a new station key with validation
    pub fn new(provider: impl Into<String>, station: impl Into<String>) -> Result<Self> {
        let key = Self {
            provider: provider.into(),
            station: station.into(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Validate that both parts are usable as single path components
    pub fn validate(&self) -> Result<()> {
        for (label, part) in [("provider", &self.provider), ("station", &self.station)] {
            if part.trim().is_empty() {
                return Err(Error::configuration(format!("{} name cannot be empty", label)));
            }
            if part.contains(['/', '\\']) || part == "." || part == ".." {
                return Err(Error::configuration(format!(
                    "{} name '{}' is not a valid path component",
                    label, part
                )));
            }
        }
        Ok(())
    }

    /// Directory holding this station's cache below `root`
    pub fn station_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.provider).join(&self.station)
    }

    /// Logging span carrying this station's identity
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("station", provider = %self.provider, station = %self.station)
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.station)
    }
}

// =============================================================================
// Observation Record
// =============================================================================

/// Scalar result of an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl ResultValue {
    /// False for NaN and infinite numbers, which JSON cannot represent
    pub fn is_finite(&self) -> bool {
        match self {
            ResultValue::Number(n) => n.is_finite(),
            _ => true,
        }
    }

    /// Convert to the JSON value sent to the entity store
    pub fn to_json(&self) -> Value {
        match self {
            ResultValue::Boolean(b) => Value::Bool(*b),
            ResultValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ResultValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<f64> for ResultValue {
    fn from(value: f64) -> Self {
        ResultValue::Number(value)
    }
}

impl From<&str> for ResultValue {
    fn from(value: &str) -> Self {
        ResultValue::Text(value.to_string())
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Boolean(b) => write!(f, "{}", b),
            ResultValue::Number(n) => write!(f, "{}", n),
            ResultValue::Text(s) => f.write_str(s),
        }
    }
}

/// A single observed value of one property at one instant
///
/// Uniqueness key within a station is `(timestamp, property)`; storing the
/// same key twice keeps the later value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Phenomenon time in UTC
    pub timestamp: DateTime<Utc>,

    /// Observed value
    pub result: ResultValue,

    /// Raw property name as it appears in source data
    pub property: String,

    /// Unit of the raw value
    pub unit: String,
}

impl Observation {
    /// Create a new observation
    pub fn new(
        timestamp: DateTime<Utc>,
        result: impl Into<ResultValue>,
        property: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            result: result.into(),
            property: property.into(),
            unit: unit.into(),
        }
    }

    /// Shard key: RFC 3339 timestamp and property name
    pub fn key(&self) -> String {
        format!(
            "{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.property
        )
    }

    /// UTC calendar day this observation belongs to
    pub fn utc_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

// =============================================================================
// Cache Envelope
// =============================================================================

/// On-disk envelope carried by every cache file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    /// Layout version of `payload`
    pub schema_version: u32,

    pub payload: T,
}

impl<T> CacheRecord<T> {
    /// Wrap a payload with the current schema version
    pub fn current(payload: T) -> Self {
        Self {
            schema_version: constants::CACHE_SCHEMA_VERSION,
            payload,
        }
    }

    /// Whether the envelope was written by the current layout
    pub fn is_current(&self) -> bool {
        self.schema_version == constants::CACHE_SCHEMA_VERSION
    }
}

// =============================================================================
// Remote References
// =============================================================================

/// Identifier and canonical link of an entity held by the remote store
///
/// Only identifiers are kept; the record itself belongs to the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRef {
    #[serde(rename = "@iot.id")]
    pub id: Value,

    #[serde(rename = "@iot.selfLink")]
    pub self_link: String,
}

impl RemoteRef {
    /// Extract the identifier and link from a remote entity body
    pub fn from_entity(entity: &Value) -> Option<Self> {
        let id = entity.get(constants::IOT_ID)?.clone();
        let self_link = entity.get(constants::IOT_SELF_LINK)?.as_str()?.to_string();
        Some(Self { id, self_link })
    }

    /// JSON object linking to this entity by id, as used in creation bodies
    pub fn as_link(&self) -> Value {
        let mut link = Map::new();
        link.insert(constants::IOT_ID.to_string(), self.id.clone());
        Value::Object(link)
    }
}

// =============================================================================
// Datastream Descriptor
// =============================================================================

/// One datastream of a station as described by its provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatastreamDescriptor {
    /// Datastream name, also the match target for raw property names
    pub name: String,

    /// Unit symbol or name
    #[serde(default)]
    pub units: String,

    /// Provider value type (e.g. "float", "string")
    #[serde(rename = "type", default)]
    pub value_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Remote Datastream entity once uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteRef>,

    /// Remote Sensor entity once uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<RemoteRef>,

    /// Remote ObservedProperty entity once uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_property: Option<RemoteRef>,

    /// Provider-specific fields carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatastreamDescriptor {
    pub fn new(name: impl Into<String>, units: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            value_type: value_type.into(),
            ..Self::default()
        }
    }

    /// Human description, falling back to the name
    pub fn description_or_name(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }
}

/// Merge an incoming datastream list with the cached one, keeping remote ids
///
/// Incoming descriptors win for every field they carry; remote references
/// missing on an incoming descriptor are taken from the cached descriptor of
/// the same name. Cached descriptors absent from `incoming` are kept at the
/// end so their remote ids are never dropped.
pub fn merge_datastreams(
    existing: &[DatastreamDescriptor],
    incoming: Vec<DatastreamDescriptor>,
) -> Vec<DatastreamDescriptor> {
    let mut merged: Vec<DatastreamDescriptor> = incoming
        .into_iter()
        .map(|mut descriptor| {
            if let Some(cached) = existing.iter().find(|d| d.name == descriptor.name) {
                if descriptor.remote.is_none() {
                    descriptor.remote = cached.remote.clone();
                }
                if descriptor.sensor.is_none() {
                    descriptor.sensor = cached.sensor.clone();
                }
                if descriptor.observed_property.is_none() {
                    descriptor.observed_property = cached.observed_property.clone();
                }
            }
            descriptor
        })
        .collect();

    for cached in existing {
        if !merged.iter().any(|d| d.name == cached.name) {
            merged.push(cached.clone());
        }
    }

    merged
}

// =============================================================================
// Data File Cursor
// =============================================================================

/// Resume state of one tracked remote source file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataFileCursor {
    pub url: String,

    pub filename: String,

    /// Last-Modified value reported by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,

    /// Bytes already consumed; `None` forces a full download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_byte_length: Option<u64>,

    /// Column headers parsed from the start of the file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parsed_column_headers: Vec<String>,
}

impl DataFileCursor {
    /// A cursor that has never been fetched
    pub fn new(url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Apply a fetch outcome, returning the advanced cursor
    ///
    /// Full downloads discard previously parsed headers unless fresh ones are
    /// supplied; partial downloads keep them.
    pub fn advance(&self, outcome: &FetchOutcome, headers: Option<Vec<String>>) -> Self {
        let parsed_column_headers = match headers {
            Some(headers) => headers,
            None if outcome.full_file => Vec::new(),
            None => self.parsed_column_headers.clone(),
        };

        Self {
            url: self.url.clone(),
            filename: self.filename.clone(),
            last_modified: outcome
                .last_modified
                .clone()
                .or_else(|| self.last_modified.clone()),
            last_byte_length: Some(outcome.content_length),
            parsed_column_headers,
        }
    }
}

/// Replace the cursor with the same URL, or append it
pub fn upsert_cursor(cursors: &mut Vec<DataFileCursor>, cursor: DataFileCursor) {
    match cursors.iter_mut().find(|c| c.url == cursor.url) {
        Some(existing) => *existing = cursor,
        None => cursors.push(cursor),
    }
}

// =============================================================================
// Fetch Outcome
// =============================================================================

/// Which branch of the resumable download protocol produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Whole resource downloaded from byte 0
    Full,
    /// Only the unseen tail downloaded
    Partial,
    /// Nothing new on the remote side
    Unchanged,
}

/// Result of one resumable download call
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Bytes fetched; `None` when nothing new was available
    pub body: Option<Vec<u8>>,

    /// Total remote length covered after this fetch
    pub content_length: u64,

    /// Last-Modified value reported by the source
    pub last_modified: Option<String>,

    /// True when `body` starts at byte 0 of the resource
    pub full_file: bool,
}

impl FetchOutcome {
    pub fn kind(&self) -> FetchKind {
        match (&self.body, self.full_file) {
            (_, true) => FetchKind::Full,
            (Some(_), false) => FetchKind::Partial,
            (None, false) => FetchKind::Unchanged,
        }
    }
}

// =============================================================================
// Station Metadata Snapshot
// =============================================================================

/// Immutable snapshot of a station's descriptive metadata
///
/// Backed by a nested JSON mapping keyed by stable field names. Mutation
/// produces a new snapshot; the store persists snapshots whole.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationMetadata {
    fields: Map<String, Value>,
}

impl StationMetadata {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a snapshot from a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::invalid_metadata(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// New snapshot with one top-level field replaced
    pub fn with_field(&self, key: impl Into<String>, value: Value) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(key.into(), value);
        Self { fields }
    }

    /// New snapshot with `partial` deep-merged in
    ///
    /// Nested mappings present on both sides merge key by key; any other
    /// incoming value (scalar, list or object over a non-object) replaces the
    /// existing one. Lists are therefore replaced whole.
    pub fn merged(&self, partial: &Map<String, Value>) -> Self {
        let mut fields = self.fields.clone();
        deep_merge(&mut fields, partial);
        Self { fields }
    }

    pub fn name(&self) -> Option<&str> {
        self.get(metadata_keys::NAME).and_then(Value::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.get(metadata_keys::DESCRIPTION).and_then(Value::as_str)
    }

    pub fn latitude(&self) -> Option<f64> {
        self.get(metadata_keys::LATITUDE).and_then(coordinate)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.get(metadata_keys::LONGITUDE).and_then(coordinate)
    }

    /// Typed view of the datastream list (empty when absent)
    pub fn datastreams(&self) -> Result<Vec<DatastreamDescriptor>> {
        self.typed_list(metadata_keys::DATASTREAMS)
    }

    /// Typed view of the tracked data files (empty when absent)
    pub fn data_files(&self) -> Result<Vec<DataFileCursor>> {
        self.typed_list(metadata_keys::DATA_FILES)
    }

    /// Remote Thing of this station, once uploaded
    pub fn thing(&self) -> Option<RemoteRef> {
        self.get(metadata_keys::THING).and_then(RemoteRef::from_entity)
    }

    /// Remote Location of this station, once uploaded
    pub fn location(&self) -> Option<RemoteRef> {
        self.get(metadata_keys::LOCATION).and_then(RemoteRef::from_entity)
    }

    /// Names of all datastreams in metadata order
    pub fn datastream_names(&self) -> Result<Vec<String>> {
        Ok(self.datastreams()?.into_iter().map(|d| d.name).collect())
    }

    fn typed_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                Error::invalid_metadata(format!("field '{}' has unexpected shape: {}", key, e))
            }),
        }
    }
}

/// Recursively merge `partial` into `target`
pub fn deep_merge(target: &mut Map<String, Value>, partial: &Map<String, Value>) {
    for (key, incoming) in partial {
        match (target.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(incoming_map)) => {
                deep_merge(existing, incoming_map);
            }
            _ => {
                target.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// Coordinates arrive as numbers or as numeric strings depending on provider
fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
