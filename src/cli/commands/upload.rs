//! Upload command implementation

use super::shared::{
    CommandStats, create_progress_bar, load_configuration, setup_logging, station_key,
};
use crate::app::adapters::http::{HttpTransport, ReqwestTransport};
use crate::app::services::entity_reconciler::EntityReconciler;
use crate::app::services::station_sync::{DescriptorOntology, StationSync, UploadReport};
use crate::cli::args::UploadArgs;
use crate::{Error, Result};
use colored::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Mirror one station's cached metadata and observations
pub async fn run_upload(args: UploadArgs) -> Result<CommandStats> {
    setup_logging(&args.global)?;
    let mut config = load_configuration(&args.global)?;
    if let Some(url) = &args.remote_url {
        config.remote.base_url = url.clone();
        config.validate()?;
    }
    let rule = args.match_rule.unwrap_or(config.matching.rule);
    let key = station_key(&args.station)?;
    let (start, end) = args.range.bounds();
    let started = Instant::now();

    let remote_transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(config.remote_transport())?);

    let mut sync = StationSync::open_cached(&config.cache.root, key.clone(), rule)?;
    if !sync.metadata_store().is_cached() {
        return Err(Error::configuration(format!(
            "No metadata cached for {}; nothing to upload",
            key
        )));
    }

    let reconciler =
        EntityReconciler::new(remote_transport, config.remote.base_url.clone()).with_span(key.span());
    info!(
        "Uploading {} to {} with {} matching",
        key,
        reconciler.base_url(),
        rule
    );

    let metadata_report = if args.skip_metadata {
        info!("Skipping metadata upload");
        UploadReport::default()
    } else {
        sync.upload_metadata(&reconciler, &DescriptorOntology).await?
    };

    let progress = args
        .global
        .show_progress()
        .then(|| create_progress_bar(0, "Uploading observations"));
    let observation_report = sync
        .upload_observations(&reconciler, start, end, progress.as_ref())
        .await?;
    if let Some(pb) = &progress {
        pb.finish_with_message("Observations uploaded");
    }

    print_summary(
        &key.to_string(),
        &metadata_report,
        &observation_report,
        started.elapsed(),
        args.skip_metadata,
    );

    Ok(CommandStats {
        stations: 1,
        observations: observation_report.mirrored(),
        failures: metadata_report.failed + observation_report.failed,
    })
}

fn print_summary(
    station: &str,
    metadata: &UploadReport,
    observations: &UploadReport,
    elapsed: std::time::Duration,
    skipped_metadata: bool,
) {
    println!("\n{}", "Upload Summary".bright_green().bold());
    println!("{} {}", "Station:".bright_cyan(), station.bright_white());

    if skipped_metadata {
        println!("{} {}", "Metadata:".bright_cyan(), "skipped".bright_yellow());
    } else {
        print_report("Metadata:", metadata);
    }
    print_report("Observations:", observations);

    println!(
        "{} {:.2}s",
        "Processing time:".bright_cyan(),
        elapsed.as_secs_f64()
    );

    let failures: Vec<&String> = metadata
        .failures
        .iter()
        .chain(observations.failures.iter())
        .collect();
    if !failures.is_empty() {
        println!("\n{}", "Failures".bright_red().bold());
        for reason in failures {
            println!("  {}", reason.bright_red());
        }
    }
}

fn print_report(label: &str, report: &UploadReport) {
    println!(
        "{} {} created, {} reused, {} updated, {} unavailable, {} failed",
        label.bright_cyan(),
        report.created.to_string().bright_white(),
        report.reused.to_string().bright_white(),
        report.updated.to_string().bright_white(),
        report.unavailable.to_string().bright_yellow(),
        if report.failed > 0 {
            report.failed.to_string().bright_red()
        } else {
            report.failed.to_string().bright_white()
        }
    );
}
