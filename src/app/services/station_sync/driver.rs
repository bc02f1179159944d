//! Metadata loading and data file synchronization

use super::{DataSyncReport, ProviderAdapter};
use crate::app::models::{
    DataFileCursor, DatastreamDescriptor, StationKey, StationMetadata, merge_datastreams,
};
use crate::app::services::metadata_store::MetadataStore;
use crate::app::services::observation_store::ObservationStore;
use crate::app::services::property_match::{MatchRule, PropertyMatchCache};
use crate::app::services::resumable_fetcher::ResumableFetcher;
use crate::constants::metadata_keys;
use crate::{Error, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{Instrument, debug, info, warn};

/// Sync cycle state for one station
pub struct StationSync {
    pub(super) key: StationKey,
    pub(super) metadata: MetadataStore,
    pub(super) observations: ObservationStore,
    /// Absent when the station was opened for cache-only work
    pub(super) fetcher: Option<ResumableFetcher>,
    pub(super) matches: PropertyMatchCache,
    pub(super) span: tracing::Span,
}

impl StationSync {
    /// Open the station's caches below `cache_root`
    ///
    /// Every component logs inside the station's span.
    pub fn open(
        cache_root: &Path,
        key: StationKey,
        fetcher: ResumableFetcher,
        rule: MatchRule,
    ) -> Result<Self> {
        let mut sync = Self::open_cached(cache_root, key, rule)?;
        sync.fetcher = Some(fetcher.with_span(sync.span.clone()));
        Ok(sync)
    }

    /// Open the caches without a fetcher
    ///
    /// Enough for uploading what is already cached; `sync_data_files` fails
    /// with a configuration error.
    pub fn open_cached(cache_root: &Path, key: StationKey, rule: MatchRule) -> Result<Self> {
        let span = key.span();
        let metadata = MetadataStore::open_with_span(cache_root, &key, span.clone())?;
        let observations = ObservationStore::new(cache_root, &key).with_span(span.clone());
        let matches = PropertyMatchCache::for_metadata(&metadata.get(), rule)?;

        Ok(Self {
            key,
            metadata,
            observations,
            fetcher: None,
            matches,
            span,
        })
    }

    pub fn key(&self) -> &StationKey {
        &self.key
    }

    /// Current metadata snapshot
    pub fn metadata(&self) -> StationMetadata {
        self.metadata.get()
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn observation_store(&self) -> &ObservationStore {
        &self.observations
    }

    pub fn match_rule(&self) -> MatchRule {
        self.matches.rule()
    }

    /// Cached metadata, fetched from the provider on first use
    pub async fn load_or_fetch_metadata(
        &mut self,
        adapter: &dyn ProviderAdapter,
    ) -> Result<StationMetadata> {
        let span = self.span.clone();
        self.load_or_fetch(adapter).instrument(span).await
    }

    async fn load_or_fetch(&mut self, adapter: &dyn ProviderAdapter) -> Result<StationMetadata> {
        if self.metadata.is_cached() {
            debug!("Using cached metadata");
            return Ok(self.metadata.get());
        }
        info!("No cached metadata; fetching from provider");
        self.refresh(adapter).await
    }

    /// Fetch metadata from the provider and merge it into the cache
    ///
    /// Remote links of known datastreams and resume state of known data
    /// files survive the refresh.
    pub async fn refresh_metadata(
        &mut self,
        adapter: &dyn ProviderAdapter,
    ) -> Result<StationMetadata> {
        let span = self.span.clone();
        self.refresh(adapter).instrument(span).await
    }

    async fn refresh(&mut self, adapter: &dyn ProviderAdapter) -> Result<StationMetadata> {
        let mut partial = adapter.fetch_metadata(&self.key).await?;
        let current = self.metadata.get();

        if let Some(value) = partial.remove(metadata_keys::DATASTREAMS) {
            let incoming: Vec<DatastreamDescriptor> = decode_list(metadata_keys::DATASTREAMS, value)?;
            let merged = merge_datastreams(&current.datastreams()?, incoming);
            partial.insert(
                metadata_keys::DATASTREAMS.to_string(),
                serde_json::to_value(merged)?,
            );
        }

        if let Some(value) = partial.remove(metadata_keys::DATA_FILES) {
            let incoming: Vec<DataFileCursor> = decode_list(metadata_keys::DATA_FILES, value)?;
            let merged = keep_resume_state(&current.data_files()?, incoming);
            partial.insert(
                metadata_keys::DATA_FILES.to_string(),
                serde_json::to_value(merged)?,
            );
        }

        let snapshot = self.metadata.merge(&partial)?;
        if self.matches.ensure_current(&snapshot)? {
            debug!("Property matches rebuilt after metadata refresh");
        }
        Ok(snapshot)
    }

    /// Fetch, parse and cache new data from every tracked file
    ///
    /// A cursor is advanced only after its body was parsed and stored. The
    /// first failure aborts the pass and is returned; files already handled
    /// keep their advanced cursors.
    pub async fn sync_data_files(
        &mut self,
        adapter: &dyn ProviderAdapter,
    ) -> Result<DataSyncReport> {
        let span = self.span.clone();
        self.sync_all(adapter).instrument(span).await
    }

    async fn sync_all(&mut self, adapter: &dyn ProviderAdapter) -> Result<DataSyncReport> {
        let fetcher = self.fetcher.clone().ok_or_else(|| {
            Error::configuration(format!("{} was opened without a fetcher", self.key))
        })?;
        let cursors = self.metadata.get().data_files()?;
        let mut report = DataSyncReport::default();

        for cursor in &cursors {
            report.files_checked += 1;
            self.sync_file(&fetcher, adapter, cursor, &mut report).await?;
        }

        info!(
            "Checked {} data files: {} fetched, {} bytes, {} observations changed",
            report.files_checked,
            report.files_fetched,
            report.bytes_fetched,
            report.stats.changed()
        );
        Ok(report)
    }

    async fn sync_file(
        &mut self,
        fetcher: &ResumableFetcher,
        adapter: &dyn ProviderAdapter,
        cursor: &DataFileCursor,
        report: &mut DataSyncReport,
    ) -> Result<()> {
        let outcome = fetcher
            .fetch(&cursor.url, cursor.last_byte_length)
            .await?;

        let Some(body) = outcome.body.as_deref() else {
            debug!("{} has no new data", cursor.filename);
            let next = cursor.advance(&outcome, None);
            if next != *cursor {
                self.metadata.upsert_data_file(next)?;
            }
            return Ok(());
        };
        report.files_fetched += 1;
        report.bytes_fetched += body.len() as u64;

        let (parsed, outcome) = match adapter.parse_data(cursor, body, outcome.full_file) {
            Ok(parsed) => (parsed, outcome),
            Err(Error::MalformedSourceData { file, message }) if !outcome.full_file => {
                warn!(
                    "Partial body of {} failed to parse ({}); fetching in full",
                    file, message
                );
                report.refetched += 1;

                let full = fetcher.fetch_full(&cursor.url).await?;
                let body = full.body.as_deref().unwrap_or_default();
                report.bytes_fetched += body.len() as u64;

                let fresh = DataFileCursor::new(cursor.url.clone(), cursor.filename.clone());
                (adapter.parse_data(&fresh, body, true)?, full)
            }
            Err(e) => return Err(e),
        };

        let stats = self.observations.store(&parsed.observations)?;
        debug!(
            "{}: {} observations parsed, {} new, {} replaced",
            cursor.filename,
            parsed.observations.len(),
            stats.inserted,
            stats.replaced
        );
        report.stats.absorb(&stats);

        let next = cursor.advance(&outcome, parsed.column_headers);
        self.metadata.upsert_data_file(next)?;
        Ok(())
    }
}

fn decode_list<T: serde::de::DeserializeOwned>(field: &str, value: Value) -> Result<Vec<T>> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).map_err(|e| {
        Error::invalid_metadata(format!("provider field '{}' has unexpected shape: {}", field, e))
    })
}

/// Cursors for still-published files keep their cached resume state
fn keep_resume_state(
    existing: &[DataFileCursor],
    incoming: Vec<DataFileCursor>,
) -> Vec<DataFileCursor> {
    incoming
        .into_iter()
        .map(|cursor| {
            existing
                .iter()
                .find(|known| known.url == cursor.url)
                .cloned()
                .unwrap_or(cursor)
        })
        .collect()
}
