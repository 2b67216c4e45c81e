//! Outbox replayer.
//!
//! Writes go to the local store first, then to the remote backend. When the
//! backend is unreachable the request is persisted as an outbox entry and the
//! caller gets [`WriteOutcome::Queued`] instead of an error. Entries are
//! replayed in enqueue order when connectivity returns, and removed only once
//! the backend accepted them (at-least-once delivery).
//!
//! Retry policy:
//! - a network failure records the attempt, schedules the next one with
//!   exponential backoff and stops the drain
//! - a rejection parks the entry as `rejected`; it stays until an operator
//!   requeues or discards it
//! - a rejected unit write rolls the local unit back to the remote copy, so
//!   the store never keeps a version the backend refused
//! - a reconnect drain ignores backoff; scheduled and manual drains only send
//!   entries that are due

use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::model::{ContentUnit, OutboxEntry, OutboxState};
use crate::remote::{RemoteGateway, unit_write_request};
use crate::storage::LocalStore;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Exponential backoff between delivery attempts of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(900),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `attempts` failures.
    #[must_use]
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// Which entries a drain may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Every pending entry, ignoring backoff. Used on reconnect.
    Forced,
    /// Only pending entries whose next attempt is due.
    DueOnly,
}

/// What happened to a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum WriteOutcome {
    /// The backend accepted it.
    Delivered,
    /// Accepted locally, pending sync.
    Queued { entry_id: String },
}

/// Result of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Delivered and removed
    pub sent: usize,
    /// Failed with a network error (at most one; the drain stops there)
    pub failed: usize,
    /// Parked because the backend refused them
    pub rejected: usize,
    /// Not yet due under backoff
    pub deferred: usize,
    /// Pending entries left afterwards
    pub remaining: usize,
    /// Another drain was already running, or the monitor said offline
    pub skipped: bool,
}

/// Resets the single-flight flag however the drain ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Captures writes that cannot reach the backend and replays them later.
pub struct OutboxReplayer<G> {
    store: Arc<dyn LocalStore>,
    gateway: Arc<G>,
    monitor: Arc<ConnectivityMonitor>,
    policy: BackoffPolicy,
    draining: AtomicBool,
}

impl<G> std::fmt::Debug for OutboxReplayer<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxReplayer")
            .field("policy", &self.policy)
            .field("draining", &self.draining.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<G: RemoteGateway> OutboxReplayer<G> {
    pub fn new(
        store: Arc<dyn LocalStore>,
        gateway: Arc<G>,
        monitor: Arc<ConnectivityMonitor>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            monitor,
            policy,
            draining: AtomicBool::new(false),
        }
    }

    /// Write a unit locally, then to the backend.
    ///
    /// The unit and its ledger entry are stored first, so local reads see the
    /// write immediately and the next pull does not overwrite it. If the
    /// backend rejects the write, the local unit is restored from the remote
    /// copy before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the local write, and `Error::Remote` if the
    /// backend rejected the write. Network failures are not errors: the write
    /// is queued.
    pub async fn write_unit(&self, unit: &ContentUnit) -> Result<WriteOutcome> {
        if unit.id.trim().is_empty() || unit.parent_group_id.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "unit id and group id must not be empty".into(),
            ));
        }

        self.store.put_content_unit(unit)?;
        self.store
            .put_ledger_entry(&unit.id, chrono::Utc::now().timestamp_millis())?;

        if !self.monitor.is_online() {
            return self.enqueue(&unit_write_request(unit)?);
        }

        match self.gateway.write_unit(unit).await {
            Ok(()) => Ok(WriteOutcome::Delivered),
            Err(e) if e.is_network() => {
                debug!(id = %unit.id, error = %e, "Write could not reach backend");
                self.enqueue(&unit_write_request(unit)?)
            }
            Err(e) => {
                warn!(id = %unit.id, error = %e, "Backend rejected write, restoring remote copy");
                self.restore_logged(&unit.id).await;
                Err(e)
            }
        }
    }

    /// Bring a unit whose write the backend refused back in line with what
    /// the backend will hold.
    ///
    /// A pending queued write for the unit wins, since it is what the backend
    /// will hold once drained. Otherwise the remote copy replaces the local
    /// one, and a unit the remote does not have is removed. When the remote
    /// cannot be read, the ledger entry is dropped so the next sync pass
    /// pulls the unit again.
    ///
    /// # Errors
    ///
    /// Returns storage errors only.
    pub async fn restore_from_remote(&self, unit_id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();

        if let Some(queued) = pending_unit_write(self.store.as_ref(), unit_id)? {
            self.store.put_content_unit(&queued)?;
            self.store.put_ledger_entry(unit_id, now)?;
            debug!(id = unit_id, "Kept the newer queued write for unit");
            return Ok(());
        }

        let Some(local) = self.store.get_content_unit(unit_id)? else {
            self.store.remove_ledger_entry(unit_id)?;
            return Ok(());
        };

        match self.gateway.fetch_group(&local.parent_group_id).await {
            Ok(group) => match group.and_then(|g| g.unit(unit_id)) {
                Some(remote) => {
                    self.store.put_content_unit(&remote.local_copy())?;
                    self.store.put_ledger_entry(unit_id, now)?;
                    info!(id = unit_id, "Restored remote copy of unit");
                }
                None => {
                    self.store.remove_content_unit(unit_id)?;
                    self.store.remove_ledger_entry(unit_id)?;
                    info!(id = unit_id, "Removed unit the remote does not have");
                }
            },
            Err(e) => {
                warn!(id = unit_id, error = %e, "Remote copy unavailable, unit will be pulled on the next pass");
                self.store.remove_ledger_entry(unit_id)?;
            }
        }
        Ok(())
    }

    async fn restore_logged(&self, unit_id: &str) {
        if let Err(e) = self.restore_from_remote(unit_id).await {
            warn!(id = unit_id, error = %e, "Failed to restore unit after rejected write");
        }
    }

    /// Send an arbitrary write, queueing it if the backend is unreachable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Remote` if the backend rejected it, or a storage error
    /// if it could not be queued.
    pub async fn submit(&self, entry: OutboxEntry) -> Result<WriteOutcome> {
        if !self.monitor.is_online() {
            return self.enqueue(&entry);
        }

        match self.gateway.send(&entry).await {
            Ok(()) => Ok(WriteOutcome::Delivered),
            Err(e) if e.is_network() => {
                debug!(path = %entry.target, error = %e, "Write could not reach backend");
                self.enqueue(&entry)
            }
            Err(e) => Err(e),
        }
    }

    fn enqueue(&self, entry: &OutboxEntry) -> Result<WriteOutcome> {
        let entry_id = self.store.enqueue_outbox(entry)?;
        info!(id = %entry_id, method = entry.method.as_str(), path = %entry.target, "Write queued");
        Ok(WriteOutcome::Queued { entry_id })
    }

    /// Replay pending entries in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the outbox itself cannot be read or updated.
    pub async fn drain(&self, mode: DrainMode) -> Result<DrainReport> {
        if !self.monitor.is_online() {
            debug!("Offline, not draining outbox");
            return Ok(DrainReport {
                skipped: true,
                remaining: self.pending_count()?,
                ..DrainReport::default()
            });
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("Outbox drain already running");
            return Ok(DrainReport {
                skipped: true,
                ..DrainReport::default()
            });
        }
        let _guard = DrainGuard(&self.draining);

        let now = chrono::Utc::now().timestamp_millis();
        let mut report = DrainReport::default();

        for entry in self.store.list_outbox()? {
            if entry.state == OutboxState::Rejected {
                continue;
            }
            if mode == DrainMode::DueOnly && !entry.is_due(now) {
                report.deferred += 1;
                continue;
            }

            match self.gateway.send(&entry).await {
                Ok(()) => {
                    self.store.remove_outbox(&entry.id)?;
                    report.sent += 1;
                }
                Err(e) if e.is_network() => {
                    let delay = self.policy.delay(entry.attempts.saturating_add(1));
                    let next = now + i64::try_from(delay.as_millis()).unwrap_or(i64::MAX / 2);
                    superseded_ok(
                        self.store.record_outbox_failure(&entry.id, &e.to_string(), next),
                    )?;
                    warn!(id = %entry.id, error = %e, retry_in_secs = delay.as_secs(), "Replay failed, stopping drain");
                    report.failed += 1;
                    break;
                }
                Err(e) => {
                    report.rejected += 1;
                    match self.store.mark_outbox_rejected(&entry.id, &e.to_string()) {
                        Ok(()) => {
                            warn!(id = %entry.id, error = %e, "Backend rejected queued write, parking it");
                            if let Some(unit_id) = &entry.unit_id {
                                self.restore_logged(unit_id).await;
                            }
                        }
                        // A newer write replaced the entry while it was in flight.
                        Err(Error::OutboxEntryNotFound { .. }) => {
                            debug!(id = %entry.id, error = %e, "Rejected write already superseded");
                        }
                        Err(other) => return Err(other),
                    }
                }
            }
        }

        report.remaining = self.pending_count()?;
        if report.sent + report.failed + report.rejected > 0 {
            info!(
                sent = report.sent,
                failed = report.failed,
                rejected = report.rejected,
                remaining = report.remaining,
                "Outbox drained"
            );
        }
        Ok(report)
    }

    fn pending_count(&self) -> Result<usize> {
        Ok(self
            .store
            .list_outbox()?
            .iter()
            .filter(|e| e.state == OutboxState::Pending)
            .count())
    }

    /// See [`requeue`].
    ///
    /// # Errors
    ///
    /// Returns `Error::OutboxEntryNotFound` if no such entry exists.
    pub fn requeue(&self, id: &str) -> Result<()> {
        requeue(self.store.as_ref(), id)
    }

    /// See [`discard`].
    ///
    /// # Errors
    ///
    /// Returns `Error::OutboxEntryNotFound` if no such entry exists.
    pub fn discard(&self, id: &str) -> Result<()> {
        discard(self.store.as_ref(), id)
    }
}

/// An entry removed under a running drain was superseded by a newer write.
fn superseded_ok(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::OutboxEntryNotFound { id }) => {
            debug!(id = %id, "Outbox entry superseded during drain");
            Ok(())
        }
        other => other,
    }
}

/// The unit carried by the newest pending write for `unit_id`, if any.
fn pending_unit_write(store: &dyn LocalStore, unit_id: &str) -> Result<Option<ContentUnit>> {
    Ok(store
        .list_outbox()?
        .into_iter()
        .rev()
        .find(|e| e.state == OutboxState::Pending && e.unit_id.as_deref() == Some(unit_id))
        .and_then(|e| e.queued_unit()))
}

/// Return a parked or backed-off entry to the queue, due immediately.
///
/// A requeued unit write is applied to the local unit again, unless a newer
/// write for the unit is already pending.
///
/// # Errors
///
/// Returns `Error::OutboxEntryNotFound` if no such entry exists.
pub fn requeue(store: &dyn LocalStore, id: &str) -> Result<()> {
    store.requeue_outbox(id)?;
    info!(id, "Outbox entry requeued");

    let Some(entry) = store.get_outbox(id)? else {
        return Ok(());
    };
    if let Some(unit_id) = &entry.unit_id {
        if let Some(newest) = pending_unit_write(store, unit_id)? {
            store.put_content_unit(&newest)?;
            store.put_ledger_entry(unit_id, chrono::Utc::now().timestamp_millis())?;
        }
    }
    Ok(())
}

/// Drop an entry without sending it.
///
/// A discarded unit write loses its ledger entry, unless another write for
/// the unit is still pending, so the next sync pass pulls the remote copy
/// over the local one.
///
/// # Errors
///
/// Returns `Error::OutboxEntryNotFound` if no such entry exists.
pub fn discard(store: &dyn LocalStore, id: &str) -> Result<()> {
    let entry = store
        .get_outbox(id)?
        .ok_or_else(|| Error::OutboxEntryNotFound { id: id.to_string() })?;
    if !store.remove_outbox(id)? {
        return Err(Error::OutboxEntryNotFound { id: id.to_string() });
    }
    info!(id, "Outbox entry discarded");

    if let Some(unit_id) = &entry.unit_id {
        if pending_unit_write(store, unit_id)?.is_none() && store.remove_ledger_entry(unit_id)? {
            debug!(id = %unit_id, "Unit will be pulled again on the next pass");
        }
    }
    Ok(())
}
