//! Observations command implementation

use super::shared::{CommandStats, load_configuration, setup_logging, station_key};
use crate::app::models::Observation;
use crate::app::services::observation_store::ObservationStore;
use crate::cli::args::{ObservationsArgs, OutputFormat};
use crate::{Error, Result};
use chrono::SecondsFormat;
use colored::*;
use tracing::info;

/// Print cached observations of one station within a time range
pub fn run_observations(args: ObservationsArgs) -> Result<CommandStats> {
    setup_logging(&args.global)?;
    let config = load_configuration(&args.global)?;
    let key = station_key(&args.station)?;
    let (start, end) = args.range.bounds();

    let store = ObservationStore::new(&config.cache.root, &key);
    let observations = store.get_all_in_range(start, end)?;
    info!(
        "{} observations cached for {} between {} and {}",
        observations.len(),
        key,
        start,
        end
    );

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&observations)
                .map_err(|e| Error::serialization("Failed to render observations", e))?;
            println!("{}", json);
        }
        OutputFormat::Table => print_table(&observations),
    }

    Ok(CommandStats {
        stations: 1,
        observations: observations.len(),
        ..Default::default()
    })
}

fn print_table(observations: &[Observation]) {
    if observations.is_empty() {
        println!("{}", "No observations in range".bright_yellow());
        return;
    }

    let property_width = observations
        .iter()
        .map(|o| o.property.len())
        .max()
        .unwrap_or(0)
        .max("property".len());

    println!(
        "{:<24}  {:<width$}  {:>14}  {}",
        "timestamp".bright_cyan(),
        "property".bright_cyan(),
        "result".bright_cyan(),
        "unit".bright_cyan(),
        width = property_width
    );
    for observation in observations {
        println!(
            "{:<24}  {:<width$}  {:>14}  {}",
            observation
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            observation.property,
            observation.result.to_string(),
            observation.unit,
            width = property_width
        );
    }
    println!(
        "\n{} {}",
        "Total:".bright_cyan(),
        observations.len().to_string().bright_white().bold()
    );
}
