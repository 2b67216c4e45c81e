//! Sync command implementation.
//!
//! Runs one pull-and-reconcile pass against the configured remote and prints
//! the pass report.

use crate::cli::commands::{gateway, open_storage, probe, runtime, settings};
use crate::context::SyncContext;
use crate::error::{Error, Result};
use crate::sync::{PassOutcome, PassReport};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

/// Execute the sync command.
///
/// # Errors
///
/// Returns an error if the database is missing, no remote is configured, or
/// the catalog could not be fetched.
pub fn execute(db_path: Option<&PathBuf>, remote: Option<&str>, json: bool) -> Result<()> {
    let storage = Arc::new(open_storage(db_path)?);
    let settings = settings(remote)?;
    let gateway = Arc::new(gateway(&settings)?);

    let rt = runtime()?;
    let report = rt.block_on(async {
        let initial = probe(&gateway, &settings).await;
        let ctx = SyncContext::new(storage, gateway, initial, settings.backoff);
        ctx.start().await
    });

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }

    match report.outcome {
        PassOutcome::FetchFailed(message) => Err(Error::Network(message)),
        PassOutcome::SkippedOffline => Err(Error::Network("remote unreachable".into())),
        PassOutcome::Completed | PassOutcome::Coalesced => Ok(()),
    }
}

fn print_report(report: &PassReport) {
    match &report.outcome {
        PassOutcome::Completed => {
            println!("{}", "Sync pass complete".green().bold());
            println!("  Catalog:   {} units", report.total);
            println!("  New:       {}", report.new_units);
            println!("  Cached:    {}", report.skipped_existing);
            if report.failed > 0 {
                println!("  Failed:    {}", report.failed.to_string().red());
            }
            println!("  Progress:  {}% ({}/{})", report.progress, report.synced, report.total);
        }
        PassOutcome::SkippedOffline => {
            println!("{}", "Offline: sync skipped, local content unchanged".yellow());
        }
        PassOutcome::Coalesced => println!("Sync already running"),
        PassOutcome::FetchFailed(_) => {
            println!("{}", "Could not fetch the remote catalog".yellow());
        }
    }
}
