//! Command-line argument definitions for sensorthings-sync
//!
//! This module defines the CLI interface using the clap derive API.

use crate::app::services::property_match::MatchRule;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the SensorThings sync tool
///
/// Inspects the per-station caches and mirrors cached metadata and
/// observations into a SensorThings-style entity store.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sensorthings-sync",
    version,
    about = "Inspect station caches and mirror them into a SensorThings entity store",
    long_about = "Works on the per-station caches written by the sync library: dated \
                  observation shards and versioned metadata records. Cached stations can be \
                  listed and queried, and mirrored idempotently into a SensorThings-style \
                  entity store, reusing or updating records that already exist remotely."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Print a station's cached metadata snapshot as JSON
    Metadata(MetadataArgs),
    /// Query cached observations of a station by time range
    Observations(ObservationsArgs),
    /// List cached stations of a provider
    Status(StatusArgs),
    /// Mirror cached metadata and observations into the entity store
    Upload(UploadArgs),
}

/// Options shared by every subcommand
#[derive(Debug, Clone, clap::Args)]
pub struct GlobalArgs {
    /// Path to configuration file
    ///
    /// Defaults to <config dir>/sensorthings-sync/config.toml when present.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Cache root directory, overriding configuration and environment
    #[arg(long = "cache-root", value_name = "PATH")]
    pub cache_root: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl GlobalArgs {
    /// Get the log level based on verbose and quiet flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Check if we should show progress bars (not in quiet mode)
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

/// Identifies one station
#[derive(Debug, Clone, clap::Args)]
pub struct StationArgs {
    /// Provider name (first level of the cache tree)
    #[arg(short = 'p', long = "provider", value_name = "NAME")]
    pub provider: String,

    /// Station identifier within the provider
    #[arg(short = 's', long = "station", value_name = "ID")]
    pub station: String,
}

/// Arguments for the metadata command
#[derive(Debug, Clone, Parser)]
pub struct MetadataArgs {
    #[command(flatten)]
    pub station: StationArgs,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Arguments for the observations command
#[derive(Debug, Clone, Parser)]
pub struct ObservationsArgs {
    #[command(flatten)]
    pub station: StationArgs,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "table")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Arguments for the status command
#[derive(Debug, Clone, Parser)]
pub struct StatusArgs {
    /// Provider whose stations are listed
    #[arg(short = 'p', long = "provider", value_name = "NAME")]
    pub provider: String,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Arguments for the upload command
#[derive(Debug, Clone, Parser)]
pub struct UploadArgs {
    #[command(flatten)]
    pub station: StationArgs,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Entity store root, overriding configuration and environment
    #[arg(long = "remote-url", value_name = "URL")]
    pub remote_url: Option<String>,

    /// How raw property names are matched to datastreams
    #[arg(long = "match-rule", value_name = "RULE")]
    pub match_rule: Option<MatchRule>,

    /// Skip mirroring Thing, Location and datastreams
    ///
    /// Observations are only mirrored for datastreams that already carry a
    /// remote link in the cached metadata.
    #[arg(long = "skip-metadata")]
    pub skip_metadata: bool,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Inclusive observation time range
#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    /// Range start: RFC 3339 instant or YYYY-MM-DD (start of day, UTC)
    #[arg(long = "start", value_name = "TIME", value_parser = parse_time_bound)]
    pub start: TimeBound,

    /// Range end: RFC 3339 instant or YYYY-MM-DD (end of day, UTC)
    #[arg(long = "end", value_name = "TIME", value_parser = parse_time_bound)]
    pub end: TimeBound,
}

impl RangeArgs {
    /// Inclusive `[start, end]` in UTC
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start.as_start(), self.end.as_end())
    }
}

/// A range endpoint given either as an instant or as a whole day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    Instant(DateTime<Utc>),
    Day(NaiveDate),
}

impl TimeBound {
    pub fn as_start(&self) -> DateTime<Utc> {
        match self {
            TimeBound::Instant(instant) => *instant,
            TimeBound::Day(day) => day.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    pub fn as_end(&self) -> DateTime<Utc> {
        match self {
            TimeBound::Instant(instant) => *instant,
            TimeBound::Day(day) => match NaiveTime::from_hms_milli_opt(23, 59, 59, 999) {
                Some(time) => day.and_time(time).and_utc(),
                None => day.and_time(NaiveTime::MIN).and_utc(),
            },
        }
    }
}

/// Parse an RFC 3339 instant or a plain date
pub fn parse_time_bound(s: &str) -> Result<TimeBound, String> {
    let s = s.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(s) {
        return Ok(TimeBound::Instant(instant.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(TimeBound::Day)
        .map_err(|_| format!("'{}' is neither an RFC 3339 instant nor a YYYY-MM-DD date", s))
}

/// Output format for observation listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned human-readable table
    Table,
    /// JSON array for scripting
    Json,
}
