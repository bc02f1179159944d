//! Per-station sync cycle over the caches, fetcher and reconciler
//!
//! One [`StationSync`] drives a single station through the pipeline:
//! metadata load, resumable fetch of each tracked data file, parse, store,
//! and later the mirroring of metadata and cached observations into the
//! entity store. Provider-specific work (discovering metadata, parsing raw
//! file bodies) and property semantics come from the caller through the
//! [`ProviderAdapter`] and [`OntologyLookup`] traits.
//!
//! The cycle is sequential and assumes it is the only writer for its
//! station. A failed step aborts the rest of the cycle; cursors and remote
//! links are persisted only after the step that produced them succeeded, so
//! re-running the cycle resumes where it stopped.

pub mod driver;
pub mod upload;

#[cfg(test)]
pub mod tests;

use crate::Result;
use crate::app::models::{DataFileCursor, DatastreamDescriptor, Observation, StationKey};
use crate::app::services::entity_reconciler::ReconcileOutcome;
use crate::app::services::observation_store::StoreStats;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub use driver::StationSync;

/// Observations parsed from one fetched body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedData {
    pub observations: Vec<Observation>,

    /// Column headers found in the body, when it started at byte 0
    pub column_headers: Option<Vec<String>>,
}

/// Provider-specific source access
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Discover station metadata as a partial mapping to merge into the cache
    ///
    /// Data files the station publishes are listed under `data_files` as
    /// cursor objects with at least `url` and `filename`.
    async fn fetch_metadata(&self, key: &StationKey) -> Result<Map<String, Value>>;

    /// Parse a fetched body
    ///
    /// For a partial body (`full_file == false`) the cursor's
    /// `parsed_column_headers` describe the columns. Unparseable bodies are
    /// reported as [`crate::Error::MalformedSourceData`].
    fn parse_data(
        &self,
        cursor: &DataFileCursor,
        body: &[u8],
        full_file: bool,
    ) -> Result<ParsedData>;
}

/// Unit of measurement in the entity store vocabulary
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UnitOfMeasurement {
    pub name: String,
    pub symbol: String,
    pub definition: String,
}

/// Semantics of a measured property
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedPropertyDescription {
    pub name: String,
    pub definition: String,
    pub description: String,
    pub unit: UnitOfMeasurement,
}

/// Maps a datastream's raw property to its observed property description
#[async_trait]
pub trait OntologyLookup: Send + Sync {
    /// `None` when the property has no known description
    async fn describe(
        &self,
        datastream: &DatastreamDescriptor,
    ) -> Result<Option<ObservedPropertyDescription>>;
}

/// Ontology that describes a property from its datastream descriptor alone
///
/// The definition is taken from a `definition` field carried on the
/// descriptor, if the provider supplies one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorOntology;

#[async_trait]
impl OntologyLookup for DescriptorOntology {
    async fn describe(
        &self,
        datastream: &DatastreamDescriptor,
    ) -> Result<Option<ObservedPropertyDescription>> {
        if datastream.name.trim().is_empty() {
            return Ok(None);
        }

        let definition = datastream
            .extra
            .get("definition")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(Some(ObservedPropertyDescription {
            name: datastream.name.clone(),
            definition,
            description: datastream.description_or_name().to_string(),
            unit: UnitOfMeasurement {
                name: datastream.units.clone(),
                symbol: datastream.units.clone(),
                definition: String::new(),
            },
        }))
    }
}

/// Result of mirroring one entity
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Mirrored(ReconcileOutcome),
    /// Nothing to mirror against, e.g. an unmapped property
    Unavailable(String),
    /// The entity store rejected the entity
    Failed(String),
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadOutcome::Mirrored(outcome) => write!(f, "{}", outcome),
            UploadOutcome::Unavailable(reason) => write!(f, "unavailable: {}", reason),
            UploadOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Counts of upload outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub created: usize,
    pub reused: usize,
    pub updated: usize,
    pub unavailable: usize,
    pub failed: usize,

    /// Reasons for each failed entity
    pub failures: Vec<String>,
}

impl UploadReport {
    pub fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Mirrored(ReconcileOutcome::Created(_)) => self.created += 1,
            UploadOutcome::Mirrored(ReconcileOutcome::Reused(_)) => self.reused += 1,
            UploadOutcome::Mirrored(ReconcileOutcome::Updated(_)) => self.updated += 1,
            UploadOutcome::Unavailable(_) => self.unavailable += 1,
            UploadOutcome::Failed(reason) => {
                self.failed += 1;
                self.failures.push(reason.clone());
            }
        }
    }

    pub fn absorb(&mut self, other: UploadReport) {
        self.created += other.created;
        self.reused += other.reused;
        self.updated += other.updated;
        self.unavailable += other.unavailable;
        self.failed += other.failed;
        self.failures.extend(other.failures);
    }

    pub fn total(&self) -> usize {
        self.created + self.reused + self.updated + self.unavailable + self.failed
    }

    /// Entities that ended up present remotely
    pub fn mirrored(&self) -> usize {
        self.created + self.reused + self.updated
    }
}

/// Counts from one pass over the tracked data files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSyncReport {
    pub files_checked: usize,

    /// Files that returned new bytes
    pub files_fetched: usize,

    pub bytes_fetched: u64,

    /// Partial bodies that failed to parse and were fetched again in full
    pub refetched: usize,

    pub stats: StoreStats,
}
