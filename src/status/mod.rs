//! Status projection.
//!
//! A derived, side-effect free view of sync progress and connectivity for
//! display. It recomputes whenever the ledger, the in-flight set, the known
//! catalog or the connectivity state changes, and publishes the result on a
//! `tokio::sync::watch` channel.
//!
//! Until a catalog has been fetched, progress is measured against the local
//! ledger itself, so an offline start shows what is already cached as
//! complete rather than an empty 0 of 0.

use crate::connectivity::ConnectivityMonitor;
use crate::model::LedgerEntry;
use crate::notify::Subscription;
use crate::storage::{LocalStore, RecordKind, read_or_default};
use crate::sync::{Catalog, InFlightSet, progress_percent};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::trace;

/// Sync progress as shown to the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub synced_count: usize,
    pub total_count: usize,
    pub sync_progress: u8,
}

/// Connectivity as shown to the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineStatus {
    pub is_online: bool,
}

/// Both views, published together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub sync: SyncStatus,
    pub online: OnlineStatus,
}

/// Compute the snapshot from its inputs.
#[must_use]
pub fn project(
    ledger: &[LedgerEntry],
    catalog: Option<&BTreeSet<String>>,
    in_flight: usize,
    is_online: bool,
) -> StatusSnapshot {
    let (synced_count, total_count) = match catalog {
        Some(ids) => (
            ledger.iter().filter(|e| ids.contains(&e.id)).count(),
            ids.len(),
        ),
        None => (ledger.len(), ledger.len()),
    };

    StatusSnapshot {
        sync: SyncStatus {
            is_syncing: in_flight > 0,
            synced_count,
            total_count,
            sync_progress: progress_percent(synced_count, total_count),
        },
        online: OnlineStatus { is_online },
    }
}

struct Sources {
    store: Arc<dyn LocalStore>,
    in_flight: Arc<InFlightSet>,
    catalog: Arc<Catalog>,
    monitor: Arc<ConnectivityMonitor>,
    tx: watch::Sender<StatusSnapshot>,
}

impl Sources {
    fn recompute(&self) {
        let ledger = read_or_default("ledger entries", self.store.list_ledger_entries());
        let snapshot = project(
            &ledger,
            self.catalog.snapshot().as_ref(),
            self.in_flight.len(),
            self.monitor.is_online(),
        );
        self.tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            trace!(?snapshot, "Status changed");
            *current = snapshot;
            true
        });
    }
}

/// Live status view. Dropping it stops the updates.
pub struct StatusProjection {
    sources: Arc<Sources>,
    _subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for StatusProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusProjection")
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl StatusProjection {
    /// Subscribe to every input and compute the initial snapshot.
    pub fn new(
        store: Arc<dyn LocalStore>,
        in_flight: Arc<InFlightSet>,
        catalog: Arc<Catalog>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        let (tx, _rx) = watch::channel(StatusSnapshot::default());
        let sources = Arc::new(Sources {
            store,
            in_flight,
            catalog,
            monitor,
            tx,
        });

        let weak = Arc::downgrade(&sources);
        let subscriptions = vec![
            sources
                .store
                .on_change(RecordKind::Ledger, Box::new(refresher(&weak))),
            sources.in_flight.on_change({
                let refresh = refresher(&weak);
                move |_| refresh()
            }),
            sources.catalog.on_change(refresher(&weak)),
            sources.monitor.on_transition({
                let refresh = refresher(&weak);
                move |_| refresh()
            }),
        ];

        sources.recompute();
        Self {
            sources,
            _subscriptions: subscriptions,
        }
    }

    /// The latest snapshot.
    #[must_use]
    pub fn current(&self) -> StatusSnapshot {
        *self.sources.tx.borrow()
    }

    /// Receive every snapshot change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sources.tx.subscribe()
    }

    /// Recompute now, for inputs that changed without notifying.
    pub fn refresh(&self) {
        self.sources.recompute();
    }
}

fn refresher(weak: &Weak<Sources>) -> impl Fn() + Send + Sync + 'static {
    let weak = weak.clone();
    move || {
        if let Some(sources) = weak.upgrade() {
            sources.recompute();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::Connectivity;
    use crate::storage::SqliteStorage;

    struct Harness {
        store: Arc<SqliteStorage>,
        in_flight: Arc<InFlightSet>,
        catalog: Arc<Catalog>,
        monitor: Arc<ConnectivityMonitor>,
        projection: StatusProjection,
    }

    fn harness() -> Harness {
        let store = Arc::new(SqliteStorage::open_memory().unwrap());
        let in_flight = Arc::new(InFlightSet::new());
        let catalog = Arc::new(Catalog::new());
        let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Online));
        let projection = StatusProjection::new(
            store.clone(),
            Arc::clone(&in_flight),
            Arc::clone(&catalog),
            Arc::clone(&monitor),
        );
        Harness {
            store,
            in_flight,
            catalog,
            monitor,
            projection,
        }
    }

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_empty_is_complete_and_idle() {
        let h = harness();
        let status = h.projection.current();
        assert_eq!(status.sync.total_count, 0);
        assert_eq!(status.sync.sync_progress, 100);
        assert!(!status.sync.is_syncing);
        assert!(status.online.is_online);
    }

    #[test]
    fn test_progress_tracks_ledger_against_catalog() {
        let h = harness();
        h.catalog.replace(ids(&["u1", "u2", "u3", "u4"]));
        assert_eq!(h.projection.current().sync.sync_progress, 0);

        h.store.put_ledger_entry("u1", 1).unwrap();
        h.store.put_ledger_entry("stale", 1).unwrap();

        let status = h.projection.current().sync;
        assert_eq!(status.synced_count, 1);
        assert_eq!(status.total_count, 4);
        assert_eq!(status.sync_progress, 25);
    }

    #[test]
    fn test_is_syncing_follows_in_flight_set() {
        let h = harness();
        {
            let _guard = h.in_flight.track("u1");
            assert!(h.projection.current().sync.is_syncing);
        }
        assert!(!h.projection.current().sync.is_syncing);
    }

    #[test]
    fn test_online_follows_monitor() {
        let h = harness();
        h.monitor.report(Connectivity::Offline);
        assert!(!h.projection.current().online.is_online);
        h.monitor.report(Connectivity::Online);
        assert!(h.projection.current().online.is_online);
    }

    #[test]
    fn test_uses_ledger_before_first_fetch() {
        let h = harness();
        h.store.put_ledger_entry("u1", 1).unwrap();
        h.store.put_ledger_entry("u2", 1).unwrap();

        let status = h.projection.current().sync;
        assert_eq!(status.synced_count, 2);
        assert_eq!(status.total_count, 2);
        assert_eq!(status.sync_progress, 100);
    }

    #[tokio::test]
    async fn test_subscribers_are_pushed_changes() {
        let h = harness();
        let mut rx = h.projection.subscribe();
        h.catalog.replace(ids(&["u1", "u2"]));

        rx.changed().await.unwrap();
        let snapshot = *rx.borrow_and_update();
        assert_eq!(snapshot.sync.total_count, 2);
        assert_eq!(snapshot.sync.sync_progress, 0);
    }

    #[test]
    fn test_projection_pure() {
        let ledger = vec![
            LedgerEntry { id: "a".into(), synced_at: 1 },
            LedgerEntry { id: "b".into(), synced_at: 1 },
        ];
        let snapshot = project(&ledger, Some(&ids(&["a", "b", "c"])), 2, false);
        assert_eq!(snapshot.sync.synced_count, 2);
        assert_eq!(snapshot.sync.sync_progress, 66);
        assert!(snapshot.sync.is_syncing);
        assert!(!snapshot.online.is_online);
    }

    #[test]
    fn test_dropping_projection_releases_subscriptions() {
        let h = harness();
        drop(h.projection);
        // Store writes keep working with nobody listening.
        h.store.put_ledger_entry("u1", 1).unwrap();
        h.monitor.report(Connectivity::Offline);
    }
}
