//! Metadata command implementation

use super::shared::{CommandStats, load_configuration, setup_logging, station_key};
use crate::app::services::metadata_store::MetadataStore;
use crate::cli::args::MetadataArgs;
use crate::{Error, Result};
use colored::*;
use tracing::info;

/// Print the cached metadata snapshot of one station as JSON
pub fn run_metadata(args: MetadataArgs) -> Result<CommandStats> {
    setup_logging(&args.global)?;
    let config = load_configuration(&args.global)?;
    let key = station_key(&args.station)?;

    let store = MetadataStore::open(&config.cache.root, &key)?;
    if !store.is_cached() {
        eprintln!(
            "{} {}",
            "No metadata cached for".bright_yellow(),
            key.to_string().bright_white().bold()
        );
        return Ok(CommandStats::default());
    }

    info!("Printing metadata from {}", store.path().display());
    let json = serde_json::to_string_pretty(store.get().as_map())
        .map_err(|e| Error::serialization("Failed to render metadata", e))?;
    println!("{}", json);

    Ok(CommandStats {
        stations: 1,
        ..Default::default()
    })
}
