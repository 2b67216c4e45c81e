//! Outbox command implementations.

use crate::cli::OutboxCommands;
use crate::cli::commands::{gateway, open_storage, probe, runtime, settings};
use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::model::{OutboxEntry, OutboxState};
use crate::outbox::{self, DrainMode, DrainReport, OutboxReplayer};
use crate::storage::{LocalStore, SqliteStorage};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Serialize)]
struct ListOutput<'a> {
    entries: &'a [OutboxEntry],
    count: usize,
}

#[derive(Serialize)]
struct ActionOutput<'a> {
    id: &'a str,
    action: &'a str,
}

/// Execute outbox commands.
///
/// # Errors
///
/// Returns an error if the database is missing, an entry id is unknown, or
/// (for `drain`) no remote is configured.
pub fn execute(
    command: &OutboxCommands,
    db_path: Option<&PathBuf>,
    remote: Option<&str>,
    json: bool,
) -> Result<()> {
    let storage = Arc::new(open_storage(db_path)?);

    match command {
        OutboxCommands::List => list(&storage, json),
        OutboxCommands::Drain { all } => drain(storage, remote, *all, json),
        OutboxCommands::Requeue { id } => {
            outbox::requeue(&*storage, id)?;
            print_action(id, "requeued", json)
        }
        OutboxCommands::Discard { id } => {
            outbox::discard(&*storage, id)?;
            print_action(id, "discarded", json)
        }
    }
}

fn list(storage: &SqliteStorage, json: bool) -> Result<()> {
    let entries = storage.list_outbox()?;

    if json {
        let output = ListOutput {
            entries: &entries,
            count: entries.len(),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }

    for entry in &entries {
        let state = match entry.state {
            OutboxState::Pending => "pending".yellow(),
            OutboxState::Rejected => "rejected".red(),
        };
        println!(
            "{} {} {} {} [{}]",
            entry.id.cyan(),
            entry.method.as_str(),
            entry.target,
            format!("attempts={}", entry.attempts).dimmed(),
            state
        );
        if let Some(error) = &entry.last_error {
            println!("    {}", error.dimmed());
        }
    }
    println!();
    println!("{} entries", entries.len());
    Ok(())
}

fn drain(storage: Arc<SqliteStorage>, remote: Option<&str>, all: bool, json: bool) -> Result<()> {
    let settings = settings(remote)?;
    let gateway = Arc::new(gateway(&settings)?);
    let mode = if all { DrainMode::Forced } else { DrainMode::DueOnly };

    let rt = runtime()?;
    let report = rt.block_on(async {
        let monitor = Arc::new(ConnectivityMonitor::new(probe(&gateway, &settings).await));
        let replayer = OutboxReplayer::new(storage, gateway, monitor, settings.backoff);
        replayer.drain(mode).await
    })?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_drain(&report);
    }

    if report.skipped && report.remaining > 0 {
        return Err(Error::Network("remote unreachable, nothing sent".into()));
    }
    Ok(())
}

fn print_drain(report: &DrainReport) {
    if report.skipped {
        println!("{}", "Offline: outbox not drained".yellow());
    } else {
        println!("Sent:      {}", report.sent.to_string().green());
        if report.deferred > 0 {
            println!("Deferred:  {} (backing off, use --all to force)", report.deferred);
        }
        if report.failed > 0 {
            println!("Failed:    {}", report.failed.to_string().yellow());
        }
        if report.rejected > 0 {
            println!("Rejected:  {}", report.rejected.to_string().red());
        }
    }
    println!("Remaining: {}", report.remaining);
}

fn print_action(id: &str, action: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&ActionOutput { id, action })?);
    } else {
        println!("Outbox entry {id} {action}");
    }
    Ok(())
}
