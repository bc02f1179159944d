//! SensorThings Sync Library
//!
//! A Rust library for mirroring weather station observations and metadata from
//! heterogeneous remote sources into a SensorThings-style entity store.
//!
//! This library provides tools for:
//! - Caching observations per station in day shards, deduplicated by key
//! - Caching station metadata as versioned, deep-mergeable snapshots
//! - Downloading only the unseen tail of growing source files
//! - Reconciling local entities against a remote store without native upsert
//! - Memoizing raw property name to datastream lookups

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod services {
        pub mod entity_reconciler;
        pub mod metadata_store;
        pub mod observation_store;
        pub mod property_match;
        pub mod resumable_fetcher;
        pub mod station_sync;
    }
    pub mod adapters {
        pub mod filesystem;
        pub mod http;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::{DataFileCursor, DatastreamDescriptor, Observation, StationKey, StationMetadata};
pub use config::Config;

/// Result type alias for the sync library
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache, fetch and reconciliation operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failed
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Connection failure or timeout talking to a remote host
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// A byte-range download was refused with an unexpected status
    #[error("Range download of {url} failed with status {status}")]
    RangeFetch { url: String, status: u16 },

    /// Unexpected status from the entity store or a source host
    #[error("{method} {url} returned unexpected status {status}: {body}")]
    RemoteProtocol {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// Source bytes could not be parsed by the provider adapter
    #[error("Malformed source data in '{file}': {message}")]
    MalformedSourceData { file: String, message: String },

    /// Cached or remote metadata does not have the expected shape
    #[error("Invalid metadata: {message}")]
    InvalidMetadata { message: String },

    /// A parent entity has not been mirrored yet
    #[error("Missing remote link for {entity}")]
    MissingRemoteLink { entity: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Date/time parsing error
    #[error("Date/time parsing error: {message}")]
    DateTimeParsing {
        message: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Processing interrupted
    #[error("Processing interrupted: {reason}")]
    ProcessingInterrupted { reason: String },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a serialization error with context
    pub fn serialization(message: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }

    /// Create a transport error
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a range download error
    pub fn range_fetch(url: impl Into<String>, status: u16) -> Self {
        Self::RangeFetch {
            url: url.into(),
            status,
        }
    }

    /// Create a remote protocol error with the offending response attached
    pub fn remote_protocol(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::RemoteProtocol {
            method: method.into(),
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Create a malformed source data error
    pub fn malformed_source_data(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedSourceData {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create an invalid metadata error
    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            message: message.into(),
        }
    }

    /// Create a missing remote link error
    pub fn missing_remote_link(entity: impl Into<String>) -> Self {
        Self::MissingRemoteLink {
            entity: entity.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a date/time parsing error
    pub fn datetime_parsing(message: impl Into<String>, source: chrono::ParseError) -> Self {
        Self::DateTimeParsing {
            message: message.into(),
            source,
        }
    }

    /// Create a processing interrupted error
    pub fn processing_interrupted(reason: impl Into<String>) -> Self {
        Self::ProcessingInterrupted {
            reason: reason.into(),
        }
    }

    /// Whether re-running the same step on the next cycle can succeed.
    ///
    /// Cursors and metadata only advance after success, so a retryable
    /// failure leaves the cache ready for the identical retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RangeFetch { .. })
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON processing failed".to_string(),
            source: error,
        }
    }
}

impl From<chrono::ParseError> for Error {
    fn from(error: chrono::ParseError) -> Self {
        Self::DateTimeParsing {
            message: "Date/time parsing failed".to_string(),
            source: error,
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(error: walkdir::Error) -> Self {
        let message = error.to_string();
        match error.into_io_error() {
            Some(source) => Self::Io {
                message: format!("Directory traversal failed: {}", message),
                source,
            },
            None => Self::Io {
                message: "Directory traversal failed".to_string(),
                source: std::io::Error::other(message),
            },
        }
    }
}
