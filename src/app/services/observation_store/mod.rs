//! Day-sharded observation cache for one station
//!
//! Observations are partitioned by UTC calendar day. Each day is one shard
//! file at `observations/YYYY/MM/DD.json` below the station directory, holding
//! an ordered map from observation key `(timestamp, property)` to the
//! observation. Storing the same key again overwrites the earlier value, so
//! repeated stores of the same batch leave the shard byte-identical.

use crate::app::adapters::filesystem;
use crate::app::models::{Observation, StationKey};
use crate::constants::{CACHE_FILE_EXTENSION, OBSERVATIONS_DIR_NAME};
use crate::Result;
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[cfg(test)]
pub mod tests;

/// One day's observations keyed by `Observation::key`
pub type Shard = BTreeMap<String, Observation>;

/// Counts from one `store` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Distinct shards the input touched
    pub days_touched: usize,

    /// Keys that were not cached before
    pub inserted: usize,

    /// Keys whose cached value changed
    pub replaced: usize,

    /// Keys already cached with an identical value
    pub unchanged: usize,

    /// Observations skipped because their numeric result is NaN or infinite
    pub rejected: usize,
}

impl StoreStats {
    /// Number of keys whose persisted value changed
    pub fn changed(&self) -> usize {
        self.inserted + self.replaced
    }

    /// Add the counts of another `store` call
    pub fn absorb(&mut self, other: &StoreStats) {
        self.days_touched += other.days_touched;
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.unchanged += other.unchanged;
        self.rejected += other.rejected;
    }
}

/// Observation cache for a single station
#[derive(Debug, Clone)]
pub struct ObservationStore {
    /// Root of this station's shard tree
    shard_root: PathBuf,
    span: tracing::Span,
}

impl ObservationStore {
    /// Open the store for `key` below the cache root
    ///
    /// Nothing is created on disk until the first `store`.
    pub fn new(cache_root: &Path, key: &StationKey) -> Self {
        Self {
            shard_root: key.station_dir(cache_root).join(OBSERVATIONS_DIR_NAME),
            span: key.span(),
        }
    }

    /// Replace the logging span events are emitted in
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Root directory of the shard tree
    pub fn shard_root(&self) -> &Path {
        &self.shard_root
    }

    /// Path of the shard holding `date`
    pub fn shard_path(&self, date: NaiveDate) -> PathBuf {
        self.shard_root
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}.{}", date.day(), CACHE_FILE_EXTENSION))
    }

    /// Upsert observations into their day shards
    ///
    /// Each affected shard is read (empty if absent), updated key by key and
    /// written back whole. Shards whose content did not change are not
    /// rewritten. Non-finite numeric results have no JSON form and are
    /// skipped with a warning.
    pub fn store(&self, observations: &[Observation]) -> Result<StoreStats> {
        let _entered = self.span.enter();
        let mut stats = StoreStats::default();

        let mut by_day: BTreeMap<NaiveDate, Vec<&Observation>> = BTreeMap::new();
        for observation in observations {
            if !observation.result.is_finite() {
                warn!(
                    "Skipping {}: non-finite result {}",
                    observation.key(),
                    observation.result
                );
                stats.rejected += 1;
                continue;
            }
            by_day
                .entry(observation.utc_date())
                .or_default()
                .push(observation);
        }

        for (date, day_observations) in by_day {
            stats.days_touched += 1;
            let mut shard = self.read_shard(date)?;
            let mut changed = false;

            for observation in day_observations {
                match shard.insert(observation.key(), observation.clone()) {
                    None => {
                        stats.inserted += 1;
                        changed = true;
                    }
                    Some(previous) if previous != *observation => {
                        stats.replaced += 1;
                        changed = true;
                    }
                    Some(_) => stats.unchanged += 1,
                }
            }

            if changed {
                filesystem::write_payload(&self.shard_path(date), &shard)?;
                debug!("Shard {} now holds {} observations", date, shard.len());
            } else {
                debug!("Shard {} unchanged", date);
            }
        }

        info!(
            "Stored {} observations across {} days ({} new, {} replaced, {} unchanged, {} rejected)",
            observations.len(),
            stats.days_touched,
            stats.inserted,
            stats.replaced,
            stats.unchanged,
            stats.rejected
        );

        Ok(stats)
    }

    /// Every cached observation with a timestamp in `[start, end]`
    ///
    /// Days without a shard contribute nothing. Results are ordered by
    /// timestamp, then property.
    pub fn get_all_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Observation>> {
        let _entered = self.span.enter();
        let mut results = Vec::new();
        if start > end {
            return Ok(results);
        }

        let mut date = start.date_naive();
        let last = end.date_naive();
        while date <= last {
            let shard = self.read_shard(date)?;
            let mut day: Vec<Observation> = shard
                .into_values()
                .filter(|o| o.timestamp >= start && o.timestamp <= end)
                .collect();
            day.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.property.cmp(&b.property))
            });
            results.append(&mut day);

            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        debug!(
            "Range {} to {} returned {} observations",
            start,
            end,
            results.len()
        );
        Ok(results)
    }

    /// Read one day's shard; a missing shard is an empty map
    pub fn read_shard(&self, date: NaiveDate) -> Result<Shard> {
        Ok(filesystem::read_payload(&self.shard_path(date))?.unwrap_or_default())
    }

    /// Dates of every shard present on disk, ascending
    pub fn cached_days(&self) -> Result<Vec<NaiveDate>> {
        let mut days = Vec::new();
        if !self.shard_root.exists() {
            return Ok(days);
        }

        for entry in WalkDir::new(&self.shard_root).min_depth(3).max_depth(3) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(date) = shard_date(&self.shard_root, entry.path()) {
                days.push(date);
            }
        }

        days.sort();
        Ok(days)
    }
}

/// Recover the date from a `YYYY/MM/DD.json` path below `root`
fn shard_date(root: &Path, path: &Path) -> Option<NaiveDate> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = relative.iter().filter_map(|p| p.to_str());
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts
        .next()?
        .strip_suffix(&format!(".{}", CACHE_FILE_EXTENSION))?
        .parse()
        .ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
