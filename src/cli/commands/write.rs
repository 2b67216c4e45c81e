//! Write command implementation.
//!
//! Writes a unit through the outbox replayer: stored locally first, then sent
//! to the remote, or queued if the remote is unreachable.

use crate::cli::WriteArgs;
use crate::cli::commands::{gateway, open_storage, probe, runtime, settings};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::model::ContentUnit;
use crate::outbox::{OutboxReplayer, WriteOutcome};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Serialize)]
struct WriteOutput<'a> {
    id: &'a str,
    group: &'a str,
    #[serde(flatten)]
    outcome: &'a WriteOutcome,
}

/// Execute the write command.
///
/// # Errors
///
/// Returns an error if the arguments are invalid, the local write fails, or
/// the remote rejected the write.
pub fn execute(args: &WriteArgs, db_path: Option<&PathBuf>, remote: Option<&str>, json: bool) -> Result<()> {
    let unit = build_unit(args)?;
    let storage = Arc::new(open_storage(db_path)?);
    let settings = settings(remote)?;
    let gateway = Arc::new(gateway(&settings)?);

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let monitor = Arc::new(ConnectivityMonitor::new(probe(&gateway, &settings).await));
        let replayer = OutboxReplayer::new(storage, gateway, monitor, settings.backoff);
        replayer.write_unit(&unit).await
    })?;

    if json {
        let output = WriteOutput {
            id: &unit.id,
            group: &unit.parent_group_id,
            outcome: &outcome,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match outcome {
        WriteOutcome::Delivered => {
            println!("{} {}", "Saved".green(), unit.id);
        }
        WriteOutcome::Queued { entry_id } => {
            println!("{} {} (accepted locally, pending sync)", "Queued".yellow(), unit.id);
            println!("  Outbox entry: {entry_id}");
        }
    }
    Ok(())
}

fn build_unit(args: &WriteArgs) -> Result<ContentUnit> {
    if args.name.trim().is_empty() {
        return Err(Error::InvalidArgument("--name must not be empty".into()));
    }

    let body = match (&args.body, &args.body_file) {
        (Some(body), _) => body.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => String::new(),
    };

    let mut unit = ContentUnit::new(&args.id, &args.name, &args.group).with_body(&body);
    if let Some(description) = &args.description {
        unit = unit.with_description(description);
    }
    if let Some(collection) = &args.collection {
        unit = unit.with_collection(collection);
    }
    Ok(unit)
}
