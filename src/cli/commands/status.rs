//! Status command implementation

use super::shared::{CommandStats, directory_size, format_size, load_configuration, setup_logging};
use crate::app::models::StationKey;
use crate::app::services::metadata_store::MetadataStore;
use crate::app::services::observation_store::ObservationStore;
use crate::cli::args::StatusArgs;
use crate::config::Config;
use crate::Result;
use colored::*;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Cache summary of one station
#[derive(Debug, Clone, PartialEq)]
pub struct StationStatus {
    pub key: StationKey,
    pub cached_days: usize,
    pub first_day: Option<chrono::NaiveDate>,
    pub last_day: Option<chrono::NaiveDate>,
    pub metadata_cached: bool,
    pub datastreams: usize,
    pub data_files: usize,
    pub thing_mirrored: bool,
    pub size_bytes: u64,
}

/// List the cached stations of one provider
pub fn run_status(args: StatusArgs) -> Result<CommandStats> {
    setup_logging(&args.global)?;
    let config = load_configuration(&args.global)?;

    let statuses = collect_status(&config, &args.provider)?;
    if statuses.is_empty() {
        println!(
            "{} {}",
            "No cached stations for provider".bright_yellow(),
            args.provider.bright_white().bold()
        );
        return Ok(CommandStats::default());
    }

    println!("\n{}", "Cache Status".bright_green().bold());
    println!(
        "{} {}",
        "Cache root:".bright_cyan(),
        config.cache.root.display().to_string().bright_white()
    );
    for status in &statuses {
        print_status(status);
    }

    Ok(CommandStats {
        stations: statuses.len(),
        ..Default::default()
    })
}

/// Summaries of every station directory below `<root>/<provider>`
pub fn collect_status(config: &Config, provider: &str) -> Result<Vec<StationStatus>> {
    let provider_dir = config.cache.root.join(provider);
    if !provider_dir.is_dir() {
        debug!("{} does not exist", provider_dir.display());
        return Ok(Vec::new());
    }

    let mut statuses = Vec::new();
    for entry in WalkDir::new(&provider_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let station = entry.file_name().to_string_lossy().to_string();
        let key = match StationKey::new(provider, station.as_str()) {
            Ok(key) => key,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        statuses.push(station_status(&config.cache.root, key, entry.path())?);
    }
    Ok(statuses)
}

fn station_status(root: &Path, key: StationKey, dir: &Path) -> Result<StationStatus> {
    let days = ObservationStore::new(root, &key).cached_days()?;
    let metadata_store = MetadataStore::open(root, &key)?;
    let metadata = metadata_store.get();

    Ok(StationStatus {
        cached_days: days.len(),
        first_day: days.first().copied(),
        last_day: days.last().copied(),
        metadata_cached: metadata_store.is_cached(),
        datastreams: metadata.datastreams().map(|d| d.len()).unwrap_or(0),
        data_files: metadata.data_files().map(|d| d.len()).unwrap_or(0),
        thing_mirrored: metadata.thing().is_some(),
        size_bytes: directory_size(dir),
        key,
    })
}

fn print_status(status: &StationStatus) {
    let yes_no = |flag: bool| {
        if flag {
            "yes".bright_green()
        } else {
            "no".bright_red()
        }
    };
    let days = match (status.first_day, status.last_day) {
        (Some(first), Some(last)) => format!("{} ({} to {})", status.cached_days, first, last),
        _ => "0".to_string(),
    };

    println!("\n{}", status.key.to_string().bright_white().bold());
    println!("  {} {}", "Cached days:".bright_cyan(), days.bright_white());
    println!(
        "  {} {}",
        "Metadata:".bright_cyan(),
        yes_no(status.metadata_cached)
    );
    println!(
        "  {} {}",
        "Datastreams:".bright_cyan(),
        status.datastreams.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Data files:".bright_cyan(),
        status.data_files.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Thing mirrored:".bright_cyan(),
        yes_no(status.thing_mirrored)
    );
    println!(
        "  {} {}",
        "Size:".bright_cyan(),
        format_size(status.size_bytes).bright_white()
    );
}
