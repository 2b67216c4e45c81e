//! Mirror command implementation.
//!
//! Fetches whole reference collections and replaces their local copies.

use crate::cli::commands::{gateway, open_storage, probe, runtime, settings};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::mirror::{CollectionMirror, MirrorOutcome, MirrorReport};
use crate::model::is_valid_collection_name;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Serialize)]
struct MirrorOutput<'a> {
    collections: &'a [MirrorReport],
}

/// Execute the mirror command.
///
/// # Errors
///
/// Returns `InvalidArgument` if no collection is named or configured, and a
/// network error if any collection could not be fetched.
pub fn execute(
    collections: &[String],
    db_path: Option<&PathBuf>,
    remote: Option<&str>,
    json: bool,
) -> Result<()> {
    let storage = Arc::new(open_storage(db_path)?);
    let settings = settings(remote)?;

    let names = if collections.is_empty() {
        settings.collections.clone()
    } else {
        collections.to_vec()
    };
    if names.is_empty() {
        return Err(Error::InvalidArgument(
            "no collections given; pass names or set mirror.collections in config.json".into(),
        ));
    }
    if let Some(bad) = names.iter().find(|n| !is_valid_collection_name(n)) {
        return Err(Error::InvalidArgument(format!("invalid collection name: '{bad}'")));
    }

    let gateway = Arc::new(gateway(&settings)?);
    let rt = runtime()?;
    let reports = rt.block_on(async {
        let monitor = Arc::new(ConnectivityMonitor::new(probe(&gateway, &settings).await));
        CollectionMirror::new(storage, gateway, monitor)
            .mirror_all(&names)
            .await
    })?;

    if json {
        println!("{}", serde_json::to_string(&MirrorOutput { collections: &reports })?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    match reports.iter().map(|r| &r.outcome).find(|o| **o != MirrorOutcome::Replaced) {
        Some(MirrorOutcome::SkippedOffline) => {
            Err(Error::Network("remote unreachable, local copies unchanged".into()))
        }
        Some(MirrorOutcome::FetchFailed(message)) => Err(Error::Network(message.clone())),
        Some(MirrorOutcome::StoreFailed(message)) => Err(Error::Other(message.clone())),
        Some(MirrorOutcome::Replaced) | None => Ok(()),
    }
}

fn print_report(report: &MirrorReport) {
    match &report.outcome {
        MirrorOutcome::Replaced => {
            print!("{} {} ({} documents", "Mirrored".green(), report.collection, report.stored);
            if report.skipped > 0 {
                print!(", {} without id skipped", report.skipped);
            }
            println!(")");
        }
        MirrorOutcome::SkippedOffline => {
            println!("{} {} (offline, local copy kept)", "Skipped".yellow(), report.collection);
        }
        MirrorOutcome::FetchFailed(message) | MirrorOutcome::StoreFailed(message) => {
            println!("{} {}: {message}", "Failed".red(), report.collection);
        }
    }
}
