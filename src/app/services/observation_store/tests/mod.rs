//! Shared test utilities and fixtures for observation store tests

use crate::app::models::{Observation, StationKey};
use crate::app::services::observation_store::ObservationStore;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;


/// Create a store for a test station below a fresh temp dir
pub fn create_test_store() -> (TempDir, ObservationStore) {
    let temp_dir = TempDir::new().unwrap();
    let key = StationKey::new("test-provider", "STATION1").unwrap();
    let store = ObservationStore::new(temp_dir.path(), &key);
    (temp_dir, store)
}

/// UTC instant from calendar parts
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .unwrap()
}

/// Numeric observation in degrees Celsius
pub fn temp_observation(timestamp: DateTime<Utc>, value: f64) -> Observation {
    Observation::new(timestamp, value, "temp", "C")
}
