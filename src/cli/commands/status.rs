//! Status command implementation.

use crate::cli::commands::{gateway, open_storage, probe, runtime, settings};
use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::error::Result;
use crate::model::OutboxState;
use crate::status::{StatusProjection, StatusSnapshot};
use crate::storage::{LocalStore, read_or_default};
use crate::sync::{Catalog, InFlightSet};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    database: String,
    remote: Option<String>,
    content_units: usize,
    groups: usize,
    outbox: OutboxCounts,
    #[serde(flatten)]
    status: StatusSnapshot,
}

#[derive(Serialize)]
struct OutboxCounts {
    pending: usize,
    rejected: usize,
}

/// Execute status command.
///
/// Reads never fail the command: unreadable counts show as zero. The remote
/// is probed only when one is configured.
pub fn execute(db_path: Option<&PathBuf>, remote: Option<&str>, json: bool) -> Result<()> {
    let storage = Arc::new(open_storage(db_path)?);
    let settings = settings(remote)?;

    let connectivity = match gateway(&settings) {
        Ok(gateway) => runtime()?.block_on(probe(&gateway, &settings)),
        Err(_) => Connectivity::Offline,
    };

    let projection = StatusProjection::new(
        storage.clone(),
        Arc::new(InFlightSet::new()),
        Arc::new(Catalog::new()),
        Arc::new(ConnectivityMonitor::new(connectivity)),
    );

    let content_units = read_or_default("content count", storage.count_content_units());
    let groups = read_or_default("group ids", storage.list_group_ids()).len();
    let outbox = OutboxCounts {
        pending: read_or_default("outbox", storage.count_outbox(OutboxState::Pending)),
        rejected: read_or_default("outbox", storage.count_outbox(OutboxState::Rejected)),
    };
    let status = projection.current();

    if json {
        let output = StatusOutput {
            database: storage_path(db_path),
            remote: settings.endpoint,
            content_units,
            groups,
            outbox,
            status,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("edusync Status");
    println!("==============");
    println!();
    println!("Remote:  {}", settings.endpoint.as_deref().unwrap_or("(not configured)"));
    if status.online.is_online {
        println!("State:   {}", "online".green());
    } else {
        println!("State:   {}", "offline".yellow());
    }
    println!();
    println!("Cached content: {content_units} units in {groups} groups");
    println!(
        "Synced:         {}/{} ({}%)",
        status.sync.synced_count, status.sync.total_count, status.sync.sync_progress
    );
    println!();
    println!("Outbox: {} pending", outbox.pending);
    if outbox.rejected > 0 {
        println!(
            "        {} rejected (see 'edusync outbox list')",
            outbox.rejected.to_string().red()
        );
    }

    Ok(())
}

fn storage_path(db_path: Option<&PathBuf>) -> String {
    crate::config::resolve_db_path(db_path.map(|p| p.as_path()))
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}
