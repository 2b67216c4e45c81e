//! SQLite storage implementation.
//!
//! This module provides the local store backend using SQLite. Writes follow
//! the MutationContext pattern: every mutation runs inside an IMMEDIATE
//! transaction, records which record kinds it touched, and change listeners
//! are notified only after the commit succeeded and the connection lock has
//! been released.

use crate::error::{Error, Result};
use crate::model::{
    AiContent, CollectionDocument, CollectionSummary, ContentUnit, LedgerEntry, OutboxEntry,
    OutboxState, WriteMethod,
};
use crate::notify::{Listeners, Subscription, lock};
use crate::storage::schema::apply_schema;
use crate::storage::{ChangeCallback, LocalStore, RecordKind};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, trace};

/// SQLite-based local store.
///
/// The connection sits behind a mutex so the store can be shared across
/// tasks; statements are short and never wait on the network.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    listeners: Listeners<RecordKind>,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures so they can declare which record kinds
/// changed; listeners for those kinds fire once the transaction commits.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: &'static str,
    changed: BTreeSet<RecordKind>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &'static str) -> Self {
        Self {
            op_name,
            changed: BTreeSet::new(),
        }
    }

    /// Mark a record kind as changed by this operation.
    pub fn touch(&mut self, kind: RecordKind) {
        self.changed.insert(kind);
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            listeners: Listeners::new(),
        }
    }

    /// Run a read against the connection.
    fn read<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        let conn = lock(&self.conn);
        Ok(f(&conn)?)
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Commits (or rolls back on error)
    /// 4. Releases the connection and notifies listeners of touched kinds
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&self, op: &'static str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let (result, changed) = {
            let mut conn = lock(&self.conn);
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let mut ctx = MutationContext::new(op);

            let result = f(&tx, &mut ctx)?;
            tx.commit()?;
            (result, ctx.changed)
        };

        trace!(op, changed = ?changed, "Mutation committed");
        for kind in &changed {
            self.listeners.emit(kind);
        }

        Ok(result)
    }

    /// Count outbox entries by state.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_outbox(&self, state: OutboxState) -> Result<usize> {
        self.read(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM outbox WHERE state = ?1",
                [state.as_str()],
                |row| row.get::<_, i64>(0),
            )
        })
        .map(|n| usize::try_from(n).unwrap_or_default())
    }

    /// Distinct group ids present locally, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_group_ids(&self) -> Result<Vec<String>> {
        self.read(|conn| {
            conn.prepare(
                "SELECT DISTINCT parent_group_id FROM content_units ORDER BY parent_group_id",
            )?
            .query_map([], |row| row.get(0))?
            .collect()
        })
    }
}

const OUTBOX_COLUMNS: &str = "id, method, target, payload, headers, fingerprint, enqueued_at, \
                              attempts, next_attempt_at, last_error, state, unit_id";

const AI_CONTENT_COLUMNS: &str =
    "id, license_key, query, content, grade_slug, subject_slug, created_at";

fn map_content_unit(row: &Row<'_>) -> rusqlite::Result<ContentUnit> {
    Ok(ContentUnit {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        body: row.get(3)?,
        parent_collection_id: row.get(4)?,
        parent_group_id: row.get(5)?,
    })
}

fn map_outbox_entry(row: &Row<'_>) -> rusqlite::Result<OutboxEntry> {
    let method: String = row.get(1)?;
    let method = WriteMethod::from_str(&method).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown write method: {method}").into(),
        )
    })?;
    let headers: String = row.get(4)?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e)))?;
    let state: String = row.get(10)?;

    Ok(OutboxEntry {
        id: row.get(0)?,
        method,
        target: row.get(2)?,
        payload: row.get(3)?,
        headers,
        fingerprint: row.get(5)?,
        enqueued_at: row.get(6)?,
        attempts: row.get(7)?,
        next_attempt_at: row.get(8)?,
        last_error: row.get(9)?,
        state: OutboxState::from_str(&state),
        unit_id: row.get(11)?,
    })
}

fn map_ai_content(row: &Row<'_>) -> rusqlite::Result<AiContent> {
    Ok(AiContent {
        id: row.get(0)?,
        license_key: row.get(1)?,
        query: row.get(2)?,
        content: row.get(3)?,
        grade_slug: row.get(4)?,
        subject_slug: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_collection_document(row: &Row<'_>) -> rusqlite::Result<CollectionDocument> {
    let data: String = row.get(1)?;
    let data = serde_json::from_str(&data)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(CollectionDocument {
        id: row.get(0)?,
        data,
    })
}

/// Fail with `OutboxEntryNotFound` when an update matched no row.
fn expect_outbox_row(updated: usize, id: &str) -> Result<()> {
    if updated == 0 {
        return Err(Error::OutboxEntryNotFound { id: id.to_string() });
    }
    Ok(())
}

impl LocalStore for SqliteStorage {
    fn put_content_unit(&self, unit: &ContentUnit) -> Result<()> {
        self.mutate("put_content_unit", |tx, ctx| {
            tx.execute(
                "INSERT INTO content_units
                    (id, name, description, body, parent_collection_id, parent_group_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    body = excluded.body,
                    parent_collection_id = excluded.parent_collection_id,
                    parent_group_id = excluded.parent_group_id,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    unit.id,
                    unit.name,
                    unit.description,
                    unit.body,
                    unit.parent_collection_id,
                    unit.parent_group_id,
                    chrono::Utc::now().timestamp_millis(),
                ],
            )?;
            ctx.touch(RecordKind::Content);
            Ok(())
        })
    }

    fn get_content_unit(&self, id: &str) -> Result<Option<ContentUnit>> {
        self.read(|conn| {
            conn.query_row(
                "SELECT id, name, description, body, parent_collection_id, parent_group_id
                 FROM content_units WHERE id = ?1",
                [id],
                map_content_unit,
            )
            .optional()
        })
    }

    fn query_content_units_by_group(&self, group_id: &str) -> Result<Vec<ContentUnit>> {
        self.read(|conn| {
            conn.prepare(
                "SELECT id, name, description, body, parent_collection_id, parent_group_id
                 FROM content_units WHERE parent_group_id = ?1",
            )?
            .query_map([group_id], map_content_unit)?
            .collect()
        })
    }

    fn count_content_units(&self) -> Result<usize> {
        self.read(|conn| {
            conn.query_row("SELECT COUNT(*) FROM content_units", [], |row| {
                row.get::<_, i64>(0)
            })
        })
        .map(|n| usize::try_from(n).unwrap_or_default())
    }

    fn remove_content_unit(&self, id: &str) -> Result<bool> {
        self.mutate("remove_content_unit", |tx, ctx| {
            let removed = tx.execute("DELETE FROM content_units WHERE id = ?1", [id])?;
            if removed > 0 {
                ctx.touch(RecordKind::Content);
            }
            Ok(removed > 0)
        })
    }

    fn put_ledger_entry(&self, id: &str, synced_at: i64) -> Result<()> {
        self.mutate("put_ledger_entry", |tx, ctx| {
            tx.execute(
                "INSERT OR REPLACE INTO sync_ledger (id, synced_at) VALUES (?1, ?2)",
                rusqlite::params![id, synced_at],
            )?;
            ctx.touch(RecordKind::Ledger);
            Ok(())
        })
    }

    fn list_ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.read(|conn| {
            conn.prepare("SELECT id, synced_at FROM sync_ledger ORDER BY synced_at, id")?
                .query_map([], |row| {
                    Ok(LedgerEntry {
                        id: row.get(0)?,
                        synced_at: row.get(1)?,
                    })
                })?
                .collect()
        })
    }

    fn has_ledger_entry(&self, id: &str) -> Result<bool> {
        self.read(|conn| {
            conn.prepare("SELECT 1 FROM sync_ledger WHERE id = ?1")?
                .exists([id])
        })
    }

    fn remove_ledger_entry(&self, id: &str) -> Result<bool> {
        self.mutate("remove_ledger_entry", |tx, ctx| {
            let removed = tx.execute("DELETE FROM sync_ledger WHERE id = ?1", [id])?;
            if removed > 0 {
                ctx.touch(RecordKind::Ledger);
            }
            Ok(removed > 0)
        })
    }

    fn enqueue_outbox(&self, entry: &OutboxEntry) -> Result<String> {
        let headers = serde_json::to_string(&entry.headers)?;

        self.mutate("enqueue_outbox", |tx, ctx| {
            if entry.method.is_idempotent() {
                // Only the newest pending write to a target decides its final state.
                let latest: Option<(String, String)> = tx
                    .query_row(
                        "SELECT id, fingerprint FROM outbox
                         WHERE target = ?1 AND state = 'pending'
                         ORDER BY seq DESC LIMIT 1",
                        [&entry.target],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                if let Some((existing, fingerprint)) = latest {
                    if fingerprint == entry.fingerprint {
                        debug!(id = %existing, fingerprint = %entry.fingerprint, "Write already queued");
                        return Ok(existing);
                    }
                }

                let superseded = tx.execute(
                    "DELETE FROM outbox
                     WHERE target = ?1 AND state = 'pending' AND method IN ('PUT', 'DELETE')",
                    [&entry.target],
                )?;
                if superseded > 0 {
                    debug!(path = %entry.target, superseded, "Dropped superseded queued writes");
                }
            }

            tx.execute(
                "INSERT INTO outbox
                    (id, method, target, payload, headers, fingerprint, enqueued_at,
                     attempts, next_attempt_at, last_error, state, unit_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    entry.id,
                    entry.method.as_str(),
                    entry.target,
                    entry.payload,
                    headers,
                    entry.fingerprint,
                    entry.enqueued_at,
                    entry.attempts,
                    entry.next_attempt_at,
                    entry.last_error,
                    entry.state.as_str(),
                    entry.unit_id,
                ],
            )?;
            ctx.touch(RecordKind::Outbox);
            Ok(entry.id.clone())
        })
    }

    fn list_outbox(&self) -> Result<Vec<OutboxEntry>> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox ORDER BY seq");
        self.read(|conn| conn.prepare(&sql)?.query_map([], map_outbox_entry)?.collect())
    }

    fn get_outbox(&self, id: &str) -> Result<Option<OutboxEntry>> {
        let sql = format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE id = ?1");
        self.read(|conn| conn.query_row(&sql, [id], map_outbox_entry).optional())
    }

    fn remove_outbox(&self, id: &str) -> Result<bool> {
        self.mutate("remove_outbox", |tx, ctx| {
            let removed = tx.execute("DELETE FROM outbox WHERE id = ?1", [id])?;
            if removed > 0 {
                ctx.touch(RecordKind::Outbox);
            }
            Ok(removed > 0)
        })
    }

    fn record_outbox_failure(&self, id: &str, error: &str, next_attempt_at: i64) -> Result<()> {
        self.mutate("record_outbox_failure", |tx, ctx| {
            let updated = tx.execute(
                "UPDATE outbox
                 SET attempts = attempts + 1, last_error = ?2, next_attempt_at = ?3
                 WHERE id = ?1",
                rusqlite::params![id, error, next_attempt_at],
            )?;
            expect_outbox_row(updated, id)?;
            ctx.touch(RecordKind::Outbox);
            Ok(())
        })
    }

    fn mark_outbox_rejected(&self, id: &str, error: &str) -> Result<()> {
        self.mutate("mark_outbox_rejected", |tx, ctx| {
            let updated = tx.execute(
                "UPDATE outbox
                 SET attempts = attempts + 1, last_error = ?2, state = 'rejected'
                 WHERE id = ?1",
                rusqlite::params![id, error],
            )?;
            expect_outbox_row(updated, id)?;
            ctx.touch(RecordKind::Outbox);
            Ok(())
        })
    }

    fn requeue_outbox(&self, id: &str) -> Result<()> {
        self.mutate("requeue_outbox", |tx, ctx| {
            let updated = tx.execute(
                "UPDATE outbox SET state = 'pending', next_attempt_at = ?2 WHERE id = ?1",
                rusqlite::params![id, chrono::Utc::now().timestamp_millis()],
            )?;
            expect_outbox_row(updated, id)?;
            ctx.touch(RecordKind::Outbox);
            Ok(())
        })
    }

    fn replace_collection(&self, name: &str, documents: &[CollectionDocument]) -> Result<usize> {
        let rows = documents
            .iter()
            .map(|doc| Ok((doc.id.as_str(), serde_json::to_string(&doc.data)?)))
            .collect::<Result<Vec<_>>>()?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("replace_collection", |tx, ctx| {
            tx.execute("DELETE FROM collection_documents WHERE collection = ?1", [name])?;
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO collection_documents (collection, id, data, mirrored_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (id, data) in &rows {
                stmt.execute(rusqlite::params![name, id, data, now])?;
            }
            ctx.touch(RecordKind::Collection);
            Ok(rows.len())
        })
    }

    fn list_collection(&self, name: &str) -> Result<Vec<CollectionDocument>> {
        self.read(|conn| {
            conn.prepare("SELECT id, data FROM collection_documents WHERE collection = ?1 ORDER BY id")?
                .query_map([name], map_collection_document)?
                .collect()
        })
    }

    fn get_collection_document(&self, name: &str, id: &str) -> Result<Option<CollectionDocument>> {
        self.read(|conn| {
            conn.query_row(
                "SELECT id, data FROM collection_documents WHERE collection = ?1 AND id = ?2",
                [name, id],
                map_collection_document,
            )
            .optional()
        })
    }

    fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        self.read(|conn| {
            conn.prepare(
                "SELECT collection, COUNT(*), MAX(mirrored_at) FROM collection_documents
                 GROUP BY collection ORDER BY collection",
            )?
            .query_map([], |row| {
                Ok(CollectionSummary {
                    name: row.get(0)?,
                    documents: usize::try_from(row.get::<_, i64>(1)?).unwrap_or_default(),
                    mirrored_at: row.get(2)?,
                })
            })?
            .collect()
        })
    }

    fn put_ai_content(&self, answer: &AiContent) -> Result<()> {
        self.mutate("put_ai_content", |tx, ctx| {
            tx.execute(
                "INSERT OR REPLACE INTO ai_content
                    (id, license_key, query, content, grade_slug, subject_slug, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    answer.id,
                    answer.license_key,
                    answer.query,
                    answer.content,
                    answer.grade_slug,
                    answer.subject_slug,
                    answer.created_at,
                ],
            )?;
            ctx.touch(RecordKind::AiContent);
            Ok(())
        })
    }

    fn get_ai_content(&self, id: &str) -> Result<Option<AiContent>> {
        let sql = format!("SELECT {AI_CONTENT_COLUMNS} FROM ai_content WHERE id = ?1");
        self.read(|conn| conn.query_row(&sql, [id], map_ai_content).optional())
    }

    fn list_ai_content(&self, grade_slug: &str, subject_slug: &str) -> Result<Vec<AiContent>> {
        let sql = format!(
            "SELECT {AI_CONTENT_COLUMNS} FROM ai_content
             WHERE grade_slug = ?1 AND subject_slug = ?2
             ORDER BY created_at DESC, id"
        );
        self.read(|conn| {
            conn.prepare(&sql)?
                .query_map([grade_slug, subject_slug], map_ai_content)?
                .collect()
        })
    }

    fn on_change(&self, kind: RecordKind, callback: ChangeCallback) -> Subscription {
        self.listeners.subscribe(move |changed| {
            if *changed == kind {
                callback();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unit(id: &str, group: &str) -> ContentUnit {
        ContentUnit::new(id, id.to_uppercase(), group).with_body("<p>body</p>")
    }

    #[test]
    fn test_open_memory() {
        assert!(SqliteStorage::open_memory().is_ok());
    }

    #[test]
    fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edusync.db");
        {
            let store = SqliteStorage::open(&path).unwrap();
            store.put_content_unit(&unit("u1", "g")).unwrap();
            store.put_ledger_entry("u1", 10).unwrap();
        }
        let store = SqliteStorage::open(&path).unwrap();
        assert!(store.has_ledger_entry("u1").unwrap());
        assert_eq!(store.get_content_unit("u1").unwrap(), Some(unit("u1", "g")));
    }

    #[test]
    fn test_put_content_unit_upserts() {
        let store = SqliteStorage::open_memory().unwrap();
        store.put_content_unit(&unit("u1", "g")).unwrap();
        store.put_content_unit(&unit("u1", "g")).unwrap();
        assert_eq!(store.count_content_units().unwrap(), 1);

        let replaced = unit("u1", "g").with_body("<p>v2</p>");
        store.put_content_unit(&replaced).unwrap();
        assert_eq!(store.get_content_unit("u1").unwrap().unwrap().body, "<p>v2</p>");
    }

    #[test]
    fn test_get_missing_unit() {
        let store = SqliteStorage::open_memory().unwrap();
        assert!(store.get_content_unit("nope").unwrap().is_none());
    }

    #[test]
    fn test_query_by_group() {
        let store = SqliteStorage::open_memory().unwrap();
        store.put_content_unit(&unit("u1", "a")).unwrap();
        store.put_content_unit(&unit("u2", "a")).unwrap();
        store.put_content_unit(&unit("u3", "b")).unwrap();

        let mut ids: Vec<String> = store
            .query_content_units_by_group("a")
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["u1", "u2"]);
        assert!(store.query_content_units_by_group("zzz").unwrap().is_empty());
        assert_eq!(store.list_group_ids().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_ledger_entry_replaced_not_duplicated() {
        let store = SqliteStorage::open_memory().unwrap();
        assert!(!store.has_ledger_entry("u1").unwrap());

        store.put_ledger_entry("u1", 100).unwrap();
        store.put_ledger_entry("u1", 200).unwrap();

        let entries = store.list_ledger_entries().unwrap();
        assert_eq!(entries, vec![LedgerEntry { id: "u1".into(), synced_at: 200 }]);
        assert!(store.has_ledger_entry("u1").unwrap());
    }

    #[test]
    fn test_outbox_enqueue_order_and_remove() {
        let store = SqliteStorage::open_memory().unwrap();
        let first = OutboxEntry::new(WriteMethod::Post, "groups/a/units", Some("{\"n\":1}".into()))
            .with_header("content-type", "application/json");
        let second = OutboxEntry::new(WriteMethod::Post, "groups/a/units", Some("{\"n\":2}".into()));

        let first_id = store.enqueue_outbox(&first).unwrap();
        let second_id = store.enqueue_outbox(&second).unwrap();

        let listed = store.list_outbox().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first_id);
        assert_eq!(listed[1].id, second_id);
        assert_eq!(listed[0].headers.get("content-type").unwrap(), "application/json");
        assert_eq!(listed[0], first);

        assert!(store.remove_outbox(&first_id).unwrap());
        assert!(!store.remove_outbox(&first_id).unwrap());
        assert_eq!(store.list_outbox().unwrap().len(), 1);
    }

    #[test]
    fn test_outbox_dedupes_idempotent_writes() {
        let store = SqliteStorage::open_memory().unwrap();
        let a = OutboxEntry::new(WriteMethod::Put, "groups/a/units/u1", Some("{}".into()))
            .with_unit("u1");
        let b = OutboxEntry::new(WriteMethod::Put, "groups/a/units/u1", Some("{}".into()));

        let id_a = store.enqueue_outbox(&a).unwrap();
        let id_b = store.enqueue_outbox(&b).unwrap();
        assert_eq!(id_a, id_b);
        let listed = store.list_outbox().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].unit_id.as_deref(), Some("u1"));

        let post = OutboxEntry::new(WriteMethod::Post, "groups/a/units", Some("{}".into()));
        let again = OutboxEntry::new(WriteMethod::Post, "groups/a/units", Some("{}".into()));
        store.enqueue_outbox(&post).unwrap();
        store.enqueue_outbox(&again).unwrap();
        assert_eq!(store.list_outbox().unwrap().len(), 3);
    }

    #[test]
    fn test_outbox_newest_write_to_a_target_wins() {
        let store = SqliteStorage::open_memory().unwrap();
        let put = |body: &str| {
            OutboxEntry::new(WriteMethod::Put, "groups/a/units/u1", Some(body.to_string()))
        };

        store.enqueue_outbox(&put("A")).unwrap();
        store.enqueue_outbox(&put("B")).unwrap();
        let last = put("A");
        let last_id = store.enqueue_outbox(&last).unwrap();

        let listed = store.list_outbox().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, last_id);
        assert_eq!(listed[0].id, last.id);
        assert_eq!(listed[0].payload.as_deref(), Some("A"));
    }

    #[test]
    fn test_superseding_keeps_other_targets_and_order() {
        let store = SqliteStorage::open_memory().unwrap();
        let other = OutboxEntry::new(WriteMethod::Put, "groups/a/units/u2", Some("X".into()));
        let event = OutboxEntry::new(WriteMethod::Post, "groups/a/units/u1", Some("E".into()));
        store
            .enqueue_outbox(&OutboxEntry::new(WriteMethod::Put, "groups/a/units/u1", Some("A".into())))
            .unwrap();
        store.enqueue_outbox(&other).unwrap();
        store.enqueue_outbox(&event).unwrap();
        let newest = OutboxEntry::new(WriteMethod::Put, "groups/a/units/u1", Some("B".into()));
        store.enqueue_outbox(&newest).unwrap();

        let ids: Vec<String> = store.list_outbox().unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![other.id, event.id, newest.id]);
    }

    #[test]
    fn test_rejected_entries_are_not_superseded() {
        let store = SqliteStorage::open_memory().unwrap();
        let first = OutboxEntry::new(WriteMethod::Put, "groups/a/units/u1", Some("A".into()));
        store.enqueue_outbox(&first).unwrap();
        store.mark_outbox_rejected(&first.id, "409 conflict").unwrap();

        store
            .enqueue_outbox(&OutboxEntry::new(WriteMethod::Put, "groups/a/units/u1", Some("B".into())))
            .unwrap();
        assert_eq!(store.list_outbox().unwrap().len(), 2);
        assert_eq!(store.count_outbox(OutboxState::Rejected).unwrap(), 1);
    }

    #[test]
    fn test_remove_unit_and_ledger_entry() {
        let store = SqliteStorage::open_memory().unwrap();
        store.put_content_unit(&unit("u1", "g")).unwrap();
        store.put_ledger_entry("u1", 1).unwrap();

        assert!(store.remove_ledger_entry("u1").unwrap());
        assert!(!store.remove_ledger_entry("u1").unwrap());
        assert!(store.get_content_unit("u1").unwrap().is_some());

        assert!(store.remove_content_unit("u1").unwrap());
        assert!(!store.remove_content_unit("u1").unwrap());
        assert_eq!(store.count_content_units().unwrap(), 0);
    }

    #[test]
    fn test_replace_collection_clears_previous_documents() {
        let store = SqliteStorage::open_memory().unwrap();
        let doc = |id: &str, active: bool| {
            CollectionDocument::from_remote(serde_json::json!({"id": id, "active": active})).unwrap()
        };

        store
            .replace_collection("licenses", &[doc("l1", true), doc("l2", true)])
            .unwrap();
        store.replace_collection("subjects", &[doc("s1", true)]).unwrap();
        assert_eq!(store.list_collection("licenses").unwrap().len(), 2);

        let stored = store.replace_collection("licenses", &[doc("l2", false)]).unwrap();
        assert_eq!(stored, 1);
        let licenses = store.list_collection("licenses").unwrap();
        assert_eq!(licenses, vec![doc("l2", false)]);
        assert!(store.get_collection_document("licenses", "l1").unwrap().is_none());
        assert_eq!(
            store.get_collection_document("subjects", "s1").unwrap(),
            Some(doc("s1", true))
        );

        let summaries = store.list_collections().unwrap();
        let names: Vec<(&str, usize)> =
            summaries.iter().map(|s| (s.name.as_str(), s.documents)).collect();
        assert_eq!(names, vec![("licenses", 1), ("subjects", 1)]);

        store.replace_collection("licenses", &[]).unwrap();
        assert!(store.list_collection("licenses").unwrap().is_empty());
        assert_eq!(store.list_collections().unwrap().len(), 1);
    }

    #[test]
    fn test_ai_content_newest_first() {
        let store = SqliteStorage::open_memory().unwrap();
        let mut older = AiContent::new("q1", "a1", "grado-5", "ciencias");
        older.created_at = 1_000;
        let mut newer = AiContent::new("q2", "a2", "grado-5", "ciencias").with_license("LIC");
        newer.created_at = 2_000;
        let elsewhere = AiContent::new("q3", "a3", "grado-6", "ciencias");

        for answer in [&older, &newer, &elsewhere] {
            store.put_ai_content(answer).unwrap();
        }

        let listed = store.list_ai_content("grado-5", "ciencias").unwrap();
        assert_eq!(listed, vec![newer.clone(), older]);
        assert_eq!(store.get_ai_content(&newer.id).unwrap(), Some(newer));
        assert!(store.get_ai_content("ai_missing").unwrap().is_none());
        assert!(store.list_ai_content("grado-5", "historia").unwrap().is_empty());
    }

    #[test]
    fn test_outbox_failure_and_rejection_bookkeeping() {
        let store = SqliteStorage::open_memory().unwrap();
        let entry = OutboxEntry::new(WriteMethod::Put, "t", None);
        let id = store.enqueue_outbox(&entry).unwrap();

        store.record_outbox_failure(&id, "timed out", 5_000).unwrap();
        let stored = store.get_outbox(&id).unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.next_attempt_at, 5_000);
        assert_eq!(stored.last_error.as_deref(), Some("timed out"));

        store.mark_outbox_rejected(&id, "422 invalid").unwrap();
        assert_eq!(store.count_outbox(OutboxState::Rejected).unwrap(), 1);
        assert_eq!(store.count_outbox(OutboxState::Pending).unwrap(), 0);

        store.requeue_outbox(&id).unwrap();
        let stored = store.get_outbox(&id).unwrap().unwrap();
        assert_eq!(stored.state, OutboxState::Pending);
        assert_eq!(stored.attempts, 2);
    }

    #[test]
    fn test_outbox_updates_on_missing_entry() {
        let store = SqliteStorage::open_memory().unwrap();
        let err = store.requeue_outbox("obx_missing").unwrap_err();
        assert!(matches!(err, Error::OutboxEntryNotFound { .. }));
    }

    #[test]
    fn test_on_change_filters_by_kind() {
        let store = SqliteStorage::open_memory().unwrap();
        let ledger_changes = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&ledger_changes);
        let sub = store.on_change(
            RecordKind::Ledger,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        store.put_content_unit(&unit("u1", "g")).unwrap();
        store.put_ledger_entry("u1", 1).unwrap();
        assert_eq!(ledger_changes.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        store.put_ledger_entry("u1", 2).unwrap();
        assert_eq!(ledger_changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_read_store() {
        let store = Arc::new(SqliteStorage::open_memory().unwrap());
        let seen = Arc::new(AtomicUsize::new(0));

        let reader = Arc::downgrade(&store);
        let counter = Arc::clone(&seen);
        let _sub = store.on_change(
            RecordKind::Ledger,
            Box::new(move || {
                if let Some(store) = reader.upgrade() {
                    let n = store.list_ledger_entries().unwrap().len();
                    counter.store(n, Ordering::SeqCst);
                }
            }),
        );

        store.put_ledger_entry("u1", 1).unwrap();
        store.put_ledger_entry("u2", 1).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_puts_for_different_ids() {
        let store = Arc::new(SqliteStorage::open_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = format!("u{i}");
                    store.put_content_unit(&unit(&id, "g")).unwrap();
                    store.put_ledger_entry(&id, i64::from(i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.count_content_units().unwrap(), 8);
        assert_eq!(store.list_ledger_entries().unwrap().len(), 8);
    }
}
