//! Pull-and-reconcile pass.
//!
//! A pass fetches the full remote catalog, skips every unit the ledger
//! already knows, and writes the rest into the local store one at a time.
//! Units in the ledger are never re-fetched, even if the remote copy changed.
//!
//! Passes never overlap. A trigger that arrives while a pass is running is
//! folded into a single re-run once the current pass finishes.

use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::model::{ContentUnit, content_hash, short_hash};
use crate::remote::RemoteGateway;
use crate::storage::{LocalStore, read_or_default};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use super::catalog::Catalog;
use super::inflight::InFlightSet;

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum PassOutcome {
    /// The catalog was fetched and every new unit attempted.
    Completed,
    /// The monitor reported offline; nothing was touched.
    SkippedOffline,
    /// Another pass was running; a re-run has been queued behind it.
    Coalesced,
    /// The catalog could not be fetched.
    FetchFailed(String),
}

/// Result of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub outcome: PassOutcome,
    /// Units in the fetched catalog
    pub total: usize,
    /// Units not yet in the ledger when the pass saw them
    pub new_units: usize,
    /// Ledger entries belonging to the catalog after the pass
    pub synced: usize,
    /// New units whose local write failed
    pub failed: usize,
    /// Units skipped because the ledger already had them
    pub skipped_existing: usize,
    /// `synced / total * 100`, or 100 for an empty catalog
    pub progress: u8,
}

impl PassReport {
    fn empty(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            total: 0,
            new_units: 0,
            synced: 0,
            failed: 0,
            skipped_existing: 0,
            progress: 0,
        }
    }
}

/// Percentage of `total` that is synced. An empty catalog counts as complete.
#[must_use]
pub fn progress_percent(synced: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = synced.min(total).saturating_mul(100) / total;
    u8::try_from(percent).unwrap_or(100)
}

/// Mirrors the remote catalog into the local store.
pub struct SyncEngine<G> {
    store: Arc<dyn LocalStore>,
    gateway: Arc<G>,
    monitor: Arc<ConnectivityMonitor>,
    in_flight: Arc<InFlightSet>,
    catalog: Arc<Catalog>,
    running: AtomicBool,
    rerun: AtomicBool,
}

impl<G> std::fmt::Debug for SyncEngine<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("running", &self.running.load(Ordering::SeqCst))
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<G: RemoteGateway> SyncEngine<G> {
    pub fn new(
        store: Arc<dyn LocalStore>,
        gateway: Arc<G>,
        monitor: Arc<ConnectivityMonitor>,
        in_flight: Arc<InFlightSet>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            store,
            gateway,
            monitor,
            in_flight,
            catalog,
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        }
    }

    /// Whether a pass is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Trigger a pass.
    ///
    /// If a pass is already running this returns immediately with
    /// [`PassOutcome::Coalesced`]; the running pass repeats once when it is
    /// done. Otherwise it runs the pass (and any re-runs queued meanwhile)
    /// and returns the report of the last one.
    pub async fn run(&self) -> PassReport {
        if self.running.swap(true, Ordering::SeqCst) {
            self.rerun.store(true, Ordering::SeqCst);
            debug!("Sync pass already running, re-run queued");
            return PassReport::empty(PassOutcome::Coalesced);
        }

        loop {
            let report = self.pass().await;
            self.running.store(false, Ordering::SeqCst);

            // A trigger may have landed between the pass ending and the flag
            // clearing; pick it up unless another caller already has.
            if self.rerun.swap(false, Ordering::SeqCst) && !self.running.swap(true, Ordering::SeqCst) {
                debug!("Running queued sync pass");
                continue;
            }
            return report;
        }
    }

    async fn pass(&self) -> PassReport {
        if !self.monitor.is_online() {
            debug!("Offline, skipping sync pass");
            return PassReport::empty(PassOutcome::SkippedOffline);
        }

        let groups = match self.gateway.fetch_all_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "Failed to fetch remote catalog");
                return PassReport::empty(PassOutcome::FetchFailed(e.to_string()));
            }
        };

        let mut seen = HashSet::new();
        let mut units = Vec::new();
        for group in groups {
            for mut unit in group.units {
                if !seen.insert(unit.id.clone()) {
                    debug!(id = %unit.id, group = %group.group_id, "Duplicate unit id in catalog, ignoring");
                    continue;
                }
                if unit.parent_group_id.is_empty() {
                    unit.parent_group_id.clone_from(&group.group_id);
                }
                units.push(unit);
            }
        }

        let catalog: BTreeSet<String> = seen.into_iter().collect();
        let total = catalog.len();
        self.catalog.replace(catalog.clone());

        let mut report = PassReport::empty(PassOutcome::Completed);
        report.total = total;

        for unit in units {
            match self.store.has_ledger_entry(&unit.id) {
                Ok(true) => {
                    report.skipped_existing += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %unit.id, error = %e, "Ledger lookup failed, skipping unit");
                    report.failed += 1;
                    continue;
                }
            }

            report.new_units += 1;
            if let Err(e) = self.replicate(&unit) {
                warn!(id = %unit.id, error = %e, "Failed to store unit, continuing");
                report.failed += 1;
            }
        }

        let ledger = read_or_default("ledger entries", self.store.list_ledger_entries());
        report.synced = ledger.iter().filter(|e| catalog.contains(&e.id)).count();
        report.progress = progress_percent(report.synced, total);

        info!(
            total,
            new = report.new_units,
            failed = report.failed,
            progress = report.progress,
            "Sync pass complete"
        );
        report
    }

    /// Write one unit and its ledger entry while it is marked in flight.
    fn replicate(&self, unit: &ContentUnit) -> Result<()> {
        let _guard = self.in_flight.track(&unit.id);

        let stored = unit.local_copy();
        self.store.put_content_unit(&stored)?;
        self.store
            .put_ledger_entry(&unit.id, chrono::Utc::now().timestamp_millis())?;

        debug!(id = %unit.id, hash = short_hash(&content_hash(&stored)), "Unit replicated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::Connectivity;
    use crate::model::{AiContent, CollectionDocument, CollectionSummary, LedgerEntry, OutboxEntry};
    use crate::notify::{Subscription, lock};
    use crate::remote::MemoryGateway;
    use crate::storage::{ChangeCallback, RecordKind, SqliteStorage};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Store wrapper counting content writes per id.
    struct CountingStore {
        inner: SqliteStorage,
        puts: Mutex<HashMap<String, usize>>,
        fail_ids: Mutex<HashSet<String>>,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: SqliteStorage::open_memory().unwrap(),
                puts: Mutex::new(HashMap::new()),
                fail_ids: Mutex::new(HashSet::new()),
            }
        }

        fn puts_for(&self, id: &str) -> usize {
            lock(&self.puts).get(id).copied().unwrap_or(0)
        }

        fn total_puts(&self) -> usize {
            lock(&self.puts).values().sum()
        }

        fn fail_on(&self, id: &str) {
            lock(&self.fail_ids).insert(id.to_string());
        }
    }

    impl LocalStore for CountingStore {
        fn put_content_unit(&self, unit: &ContentUnit) -> Result<()> {
            if lock(&self.fail_ids).contains(&unit.id) {
                return Err(crate::error::Error::Storage(rusqlite::Error::InvalidQuery));
            }
            *lock(&self.puts).entry(unit.id.clone()).or_default() += 1;
            self.inner.put_content_unit(unit)
        }
        fn get_content_unit(&self, id: &str) -> Result<Option<ContentUnit>> {
            self.inner.get_content_unit(id)
        }
        fn query_content_units_by_group(&self, group_id: &str) -> Result<Vec<ContentUnit>> {
            self.inner.query_content_units_by_group(group_id)
        }
        fn count_content_units(&self) -> Result<usize> {
            self.inner.count_content_units()
        }
        fn remove_content_unit(&self, id: &str) -> Result<bool> {
            self.inner.remove_content_unit(id)
        }
        fn put_ledger_entry(&self, id: &str, synced_at: i64) -> Result<()> {
            self.inner.put_ledger_entry(id, synced_at)
        }
        fn list_ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
            self.inner.list_ledger_entries()
        }
        fn has_ledger_entry(&self, id: &str) -> Result<bool> {
            self.inner.has_ledger_entry(id)
        }
        fn remove_ledger_entry(&self, id: &str) -> Result<bool> {
            self.inner.remove_ledger_entry(id)
        }
        fn enqueue_outbox(&self, entry: &OutboxEntry) -> Result<String> {
            self.inner.enqueue_outbox(entry)
        }
        fn list_outbox(&self) -> Result<Vec<OutboxEntry>> {
            self.inner.list_outbox()
        }
        fn get_outbox(&self, id: &str) -> Result<Option<OutboxEntry>> {
            self.inner.get_outbox(id)
        }
        fn remove_outbox(&self, id: &str) -> Result<bool> {
            self.inner.remove_outbox(id)
        }
        fn record_outbox_failure(&self, id: &str, error: &str, next: i64) -> Result<()> {
            self.inner.record_outbox_failure(id, error, next)
        }
        fn mark_outbox_rejected(&self, id: &str, error: &str) -> Result<()> {
            self.inner.mark_outbox_rejected(id, error)
        }
        fn requeue_outbox(&self, id: &str) -> Result<()> {
            self.inner.requeue_outbox(id)
        }
        fn replace_collection(&self, name: &str, docs: &[CollectionDocument]) -> Result<usize> {
            self.inner.replace_collection(name, docs)
        }
        fn list_collection(&self, name: &str) -> Result<Vec<CollectionDocument>> {
            self.inner.list_collection(name)
        }
        fn get_collection_document(&self, name: &str, id: &str) -> Result<Option<CollectionDocument>> {
            self.inner.get_collection_document(name, id)
        }
        fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
            self.inner.list_collections()
        }
        fn put_ai_content(&self, answer: &AiContent) -> Result<()> {
            self.inner.put_ai_content(answer)
        }
        fn get_ai_content(&self, id: &str) -> Result<Option<AiContent>> {
            self.inner.get_ai_content(id)
        }
        fn list_ai_content(&self, grade: &str, subject: &str) -> Result<Vec<AiContent>> {
            self.inner.list_ai_content(grade, subject)
        }
        fn on_change(&self, kind: RecordKind, callback: ChangeCallback) -> Subscription {
            self.inner.on_change(kind, callback)
        }
    }

    struct Harness {
        store: Arc<CountingStore>,
        gateway: Arc<MemoryGateway>,
        monitor: Arc<ConnectivityMonitor>,
        in_flight: Arc<InFlightSet>,
        engine: SyncEngine<MemoryGateway>,
    }

    fn harness(initial: Connectivity) -> Harness {
        let store = Arc::new(CountingStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let monitor = Arc::new(ConnectivityMonitor::new(initial));
        let in_flight = Arc::new(InFlightSet::new());
        let engine = SyncEngine::new(
            store.clone(),
            Arc::clone(&gateway),
            Arc::clone(&monitor),
            Arc::clone(&in_flight),
            Arc::new(Catalog::new()),
        );
        Harness {
            store,
            gateway,
            monitor,
            in_flight,
            engine,
        }
    }

    fn unit(id: &str) -> ContentUnit {
        ContentUnit::new(id, id.to_uppercase(), "").with_body(&format!("<p>{id}</p>"))
    }

    fn seed_two_groups(gateway: &MemoryGateway) {
        gateway.set_group("A", vec![unit("u1"), unit("u2")]);
        gateway.set_group("B", vec![unit("u3")]);
    }

    #[tokio::test]
    async fn test_two_group_scenario() {
        let h = harness(Connectivity::Online);
        seed_two_groups(&h.gateway);

        let report = h.engine.run().await;

        assert_eq!(report.outcome, PassOutcome::Completed);
        assert_eq!(report.total, 3);
        assert_eq!(report.new_units, 3);
        assert_eq!(report.synced, 3);
        assert_eq!(report.progress, 100);
        assert_eq!(h.store.list_ledger_entries().unwrap().len(), 3);
        assert!(h.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_pulled_units_match_remote() {
        let h = harness(Connectivity::Online);
        seed_two_groups(&h.gateway);
        h.engine.run().await;

        for (group, id) in [("A", "u1"), ("A", "u2"), ("B", "u3")] {
            assert!(h.store.has_ledger_entry(id).unwrap());
            let local = h.store.get_content_unit(id).unwrap().unwrap();
            assert_eq!(Some(local), h.gateway.unit(group, id));
        }
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let h = harness(Connectivity::Online);
        seed_two_groups(&h.gateway);

        h.engine.run().await;
        let report = h.engine.run().await;

        assert_eq!(report.new_units, 0);
        assert_eq!(report.skipped_existing, 3);
        assert_eq!(report.progress, 100);
        assert_eq!(h.store.total_puts(), 3);
    }

    #[tokio::test]
    async fn test_ledgered_unit_not_refetched_after_remote_change() {
        let h = harness(Connectivity::Online);
        h.gateway.set_group("A", vec![unit("u1")]);
        h.engine.run().await;

        h.gateway
            .set_group("A", vec![unit("u1").with_body("<p>revised</p>")]);
        h.engine.run().await;

        let local = h.store.get_content_unit("u1").unwrap().unwrap();
        assert_eq!(local.body, "<p>u1</p>");
        assert_eq!(h.store.puts_for("u1"), 1);
    }

    #[tokio::test]
    async fn test_offline_pass_is_a_no_op() {
        let h = harness(Connectivity::Offline);
        seed_two_groups(&h.gateway);

        let report = h.engine.run().await;

        assert_eq!(report.outcome, PassOutcome::SkippedOffline);
        assert_eq!(h.gateway.attempt_count(), 0);
        assert!(h.store.list_ledger_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_state() {
        let h = harness(Connectivity::Online);
        h.gateway.set_online(false);

        let report = h.engine.run().await;

        assert!(matches!(report.outcome, PassOutcome::FetchFailed(_)));
        assert!(h.store.list_ledger_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_catalog_is_complete() {
        let h = harness(Connectivity::Online);
        let report = h.engine.run().await;
        assert_eq!(report.total, 0);
        assert_eq!(report.progress, 100);
    }

    #[tokio::test]
    async fn test_unit_failure_does_not_abort_pass() {
        let h = harness(Connectivity::Online);
        seed_two_groups(&h.gateway);
        h.store.fail_on("u2");

        let report = h.engine.run().await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.synced, 2);
        assert_eq!(report.progress, 66);
        assert!(!h.store.has_ledger_entry("u2").unwrap());
        assert!(h.store.has_ledger_entry("u3").unwrap());
        assert!(h.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_failed_unit_retried_next_pass() {
        let h = harness(Connectivity::Online);
        h.gateway.set_group("A", vec![unit("u1")]);
        h.store.fail_on("u1");
        h.engine.run().await;

        lock(&h.store.fail_ids).clear();
        let report = h.engine.run().await;
        assert_eq!(report.new_units, 1);
        assert!(h.store.has_ledger_entry("u1").unwrap());
    }

    #[tokio::test]
    async fn test_back_to_back_triggers_write_each_unit_once() {
        let h = harness(Connectivity::Online);
        seed_two_groups(&h.gateway);

        let (first, second) = tokio::join!(h.engine.run(), h.engine.run());

        assert_eq!(first.outcome, PassOutcome::Completed);
        assert_eq!(second.outcome, PassOutcome::Coalesced);
        for id in ["u1", "u2", "u3"] {
            assert_eq!(h.store.puts_for(id), 1, "{id}");
        }
        // The coalesced trigger became exactly one extra fetch.
        assert_eq!(h.gateway.calls().len(), 2);
        assert!(!h.engine.is_running());
    }

    #[tokio::test]
    async fn test_duplicate_ids_across_groups_written_once() {
        let h = harness(Connectivity::Online);
        h.gateway.set_group("A", vec![unit("shared")]);
        h.gateway.set_group("B", vec![unit("shared")]);

        let report = h.engine.run().await;

        assert_eq!(report.total, 1);
        assert_eq!(h.store.puts_for("shared"), 1);
        let local = h.store.get_content_unit("shared").unwrap().unwrap();
        assert_eq!(local.parent_group_id, "A");
    }

    #[tokio::test]
    async fn test_empty_body_gets_placeholder() {
        let h = harness(Connectivity::Online);
        h.gateway
            .set_group("A", vec![ContentUnit::new("atoms", "Atoms", "")]);
        h.engine.run().await;

        let local = h.store.get_content_unit("atoms").unwrap().unwrap();
        assert_eq!(local.body, "<p>Content for Atoms not found.</p>");
    }

    #[tokio::test]
    async fn test_runs_after_reconnect() {
        let h = harness(Connectivity::Offline);
        seed_two_groups(&h.gateway);
        assert_eq!(h.engine.run().await.outcome, PassOutcome::SkippedOffline);

        h.monitor.report(Connectivity::Online);
        assert_eq!(h.engine.run().await.synced, 3);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 100);
        assert_eq!(progress_percent(0, 4), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(5, 3), 100);
    }
}
