//! Watch command implementation.
//!
//! Keeps the offline layer alive in the foreground: probes the remote on an
//! interval, feeds the result to the connectivity monitor, drains due outbox
//! entries while online and prints every status change until Ctrl-C.
//!
//! Reconnects trigger a sync pass, a forced drain and a re-mirror of the
//! configured collections through the context's own wiring; this loop only
//! reports what the platform observes. Mirrored collections are re-read from
//! the local store on their own interval and printed when they change.

use crate::cli::commands::{gateway, open_storage, probe, runtime, settings};
use crate::connectivity::{Connectivity, ReachabilityProbe};
use crate::context::SyncContext;
use crate::error::Result;
use crate::model::CollectionSummary;
use crate::outbox::DrainMode;
use crate::remote::HttpGateway;
use crate::status::StatusSnapshot;
use crate::storage::{LocalStore, read_or_default};
use crate::sync::PassOutcome;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Execute the watch command.
///
/// # Errors
///
/// Returns an error if the database is missing or no remote is configured.
/// Connectivity problems never end the loop.
pub fn execute(db_path: Option<&PathBuf>, remote: Option<&str>, json: bool) -> Result<()> {
    let storage = Arc::new(open_storage(db_path)?);
    let settings = settings(remote)?;
    let gateway = Arc::new(gateway(&settings)?);
    let reachability = ReachabilityProbe::for_endpoint(gateway.endpoint(), settings.timeout);

    let rt = runtime()?;
    rt.block_on(async {
        let initial = probe(&gateway, &settings).await;
        let ctx = SyncContext::new(storage, Arc::clone(&gateway), initial, settings.backoff)
            .with_collections(settings.collections.clone());

        if !json {
            println!(
                "Watching {} every {}s (Ctrl-C to stop)",
                gateway.endpoint(),
                settings.probe_interval.as_secs()
            );
        }

        let report = ctx.start().await;
        if let PassOutcome::FetchFailed(message) = &report.outcome {
            warn!(error = %message, "Startup sync pass could not fetch the catalog");
        }
        for mirrored in ctx.mirror_collections().await {
            debug!(collection = %mirrored.collection, outcome = ?mirrored.outcome, "Startup mirror");
        }

        let mut updates = ctx.status().subscribe();
        print_snapshot(&updates.borrow_and_update(), json);

        let mut ticker = tokio::time::interval(settings.probe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut poll = tokio::time::interval(settings.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut collections = Vec::new();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupted, stopping watch");
                    break;
                }
                _ = ticker.tick() => tick(&ctx, reachability.as_ref()).await,
                _ = poll.tick() => {
                    if !ctx.collections().is_empty() {
                        poll_collections(&**ctx.store(), &mut collections, json);
                    }
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *updates.borrow_and_update();
                    print_snapshot(&snapshot, json);
                }
            }
        }
    });

    Ok(())
}

async fn tick(ctx: &SyncContext<HttpGateway>, reachability: Option<&ReachabilityProbe>) {
    let observed = match reachability {
        Some(probe) => probe.check().await,
        None => Connectivity::Online,
    };

    if ctx.monitor().report(observed).is_some() {
        // A reconnect already spawned a forced drain.
        return;
    }

    if observed.is_online() {
        match ctx.outbox().drain(DrainMode::DueOnly).await {
            Ok(report) if report.sent + report.rejected > 0 => {
                debug!(sent = report.sent, rejected = report.rejected, "Scheduled outbox drain");
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Scheduled outbox drain failed"),
        }
    }
}

/// Re-read the mirrored collections and print them if they changed.
fn poll_collections(store: &dyn LocalStore, last: &mut Vec<CollectionSummary>, json: bool) {
    let current = read_or_default("collections", store.list_collections());
    if current == *last {
        return;
    }

    if json {
        match serde_json::to_string(&serde_json::json!({ "collections": &current })) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize collections"),
        }
    } else {
        let time = chrono::Local::now().format("%H:%M:%S");
        let listed: Vec<String> = current
            .iter()
            .map(|c| format!("{} {}", c.name, c.documents))
            .collect();
        println!("[{time}] collections: {}", listed.join(", "));
    }
    *last = current;
}

fn print_snapshot(snapshot: &StatusSnapshot, json: bool) {
    if json {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize status"),
        }
        return;
    }

    let time = chrono::Local::now().format("%H:%M:%S");
    let state = if snapshot.online.is_online {
        "online ".green()
    } else {
        "offline".yellow()
    };
    let activity = if snapshot.sync.is_syncing {
        "syncing".cyan()
    } else {
        "idle".dimmed()
    };
    println!(
        "[{time}] {state}  {}/{} ({}%)  {activity}",
        snapshot.sync.synced_count, snapshot.sync.total_count, snapshot.sync.sync_progress
    );
}
