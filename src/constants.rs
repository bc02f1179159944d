//! Application constants for the SensorThings sync
//!
//! This module contains cache layout names, default values and the entity
//! store vocabulary used throughout the application.

// =============================================================================
// Cache Layout
// =============================================================================

/// Schema version written into every cache envelope
pub const CACHE_SCHEMA_VERSION: u32 = 2;

/// File name of a station's metadata record
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Directory holding a station's dated observation shards
pub const OBSERVATIONS_DIR_NAME: &str = "observations";

/// Extension used by every cache file
pub const CACHE_FILE_EXTENSION: &str = "json";

/// Application directory name under the platform cache/config dirs
pub const APP_DIR_NAME: &str = "sensorthings-sync";

/// Configuration file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

// =============================================================================
// Metadata Field Names
// =============================================================================

/// Stable top-level keys of a station metadata snapshot
pub mod metadata_keys {
    pub const NAME: &str = "name";
    pub const DESCRIPTION: &str = "description";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const DATASTREAMS: &str = "datastreams";
    pub const DATA_FILES: &str = "data_files";
    pub const THING: &str = "thing";
    pub const LOCATION: &str = "location";
    pub const PROPERTIES: &str = "properties";
}

// =============================================================================
// Entity Store Vocabulary
// =============================================================================

/// Field carrying an entity's remote identifier
pub const IOT_ID: &str = "@iot.id";

/// Field carrying an entity's canonical link
pub const IOT_SELF_LINK: &str = "@iot.selfLink";

/// Encoding type used for GeoJSON locations
pub const GEOJSON_ENCODING: &str = "application/vnd.geo+json";

/// Encoding type used for sensor descriptions
pub const SENSOR_ENCODING: &str = "application/pdf";

/// Default observation type when a datastream does not name one
pub const DEFAULT_OBSERVATION_TYPE: &str =
    "http://www.opengis.net/def/observationType/OGC-OM/2.0/OM_Measurement";

// =============================================================================
// HTTP Defaults
// =============================================================================

/// Default timeout for source and entity store calls (30 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

/// Default user agent for outgoing requests
pub const DEFAULT_USER_AGENT: &str = concat!("sensorthings-sync/", env!("CARGO_PKG_VERSION"));

/// Default entity store root
pub const DEFAULT_REMOTE_URL: &str = "http://localhost:8080/FROST-Server/v1.1";

/// Environment variable overriding the cache root
pub const ENV_CACHE_ROOT: &str = "STA_SYNC_CACHE_ROOT";

/// Environment variable overriding the entity store root
pub const ENV_REMOTE_URL: &str = "STA_SYNC_REMOTE_URL";

/// Environment variable overriding both timeouts
pub const ENV_TIMEOUT_SECS: &str = "STA_SYNC_TIMEOUT_SECS";
