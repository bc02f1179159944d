//! Command implementations for the sensorthings-sync CLI
//!
//! Each subcommand lives in its own module:
//! - `metadata`: print a station's cached metadata snapshot
//! - `observations`: query cached observations by time range
//! - `status`: list the cached stations of a provider
//! - `upload`: mirror a station into the entity store

pub mod metadata;
pub mod observations;
pub mod shared;
pub mod status;
pub mod upload;

pub use shared::CommandStats;

use crate::cli::args::{Args, Commands};
use crate::{Error, Result};

/// Dispatch to the subcommand handler
pub async fn run(args: Args) -> Result<CommandStats> {
    let command = args
        .command
        .ok_or_else(|| Error::configuration("No subcommand given"))?;

    match command {
        Commands::Metadata(metadata_args) => metadata::run_metadata(metadata_args),
        Commands::Observations(observations_args) => {
            observations::run_observations(observations_args)
        }
        Commands::Status(status_args) => status::run_status(status_args),
        Commands::Upload(upload_args) => upload::run_upload(upload_args).await,
    }
}
