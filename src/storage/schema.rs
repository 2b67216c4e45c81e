//! Database schema definitions.
//!
//! One table per record kind: `content_units`, `sync_ledger`, `outbox`,
//! `collection_documents` and `ai_content`.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the edusync database.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r#"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Content
-- ====================

-- Content units: replicated curriculum material, flattened out of groups
CREATE TABLE IF NOT EXISTS content_units (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    parent_collection_id TEXT NOT NULL DEFAULT '',
    parent_group_id TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_content_units_group ON content_units(parent_group_id);

-- Sync ledger: one row per unit that is present and current locally
CREATE TABLE IF NOT EXISTS sync_ledger (
    id TEXT PRIMARY KEY,
    synced_at INTEGER NOT NULL
);

-- ====================
-- Outbox
-- ====================

-- Writes that could not reach the remote backend. `seq` preserves enqueue order.
CREATE TABLE IF NOT EXISTS outbox (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    method TEXT NOT NULL,
    target TEXT NOT NULL,
    payload TEXT,
    headers TEXT NOT NULL DEFAULT '{}',
    fingerprint TEXT NOT NULL DEFAULT '',
    unit_id TEXT,
    enqueued_at INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    next_attempt_at INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    state TEXT NOT NULL DEFAULT 'pending' CHECK (state IN ('pending', 'rejected'))
);

CREATE INDEX IF NOT EXISTS idx_outbox_state ON outbox(state, next_attempt_at);
CREATE INDEX IF NOT EXISTS idx_outbox_target ON outbox(target, state);

-- ====================
-- Mirrored collections
-- ====================

-- Reference data replaced wholesale on every mirror; `data` is the remote JSON
CREATE TABLE IF NOT EXISTS collection_documents (
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    data TEXT NOT NULL,
    mirrored_at INTEGER NOT NULL,
    PRIMARY KEY (collection, id)
);

-- ====================
-- AI answers
-- ====================

CREATE TABLE IF NOT EXISTS ai_content (
    id TEXT PRIMARY KEY,
    license_key TEXT NOT NULL DEFAULT '',
    query TEXT NOT NULL,
    content TEXT NOT NULL,
    grade_slug TEXT NOT NULL,
    subject_slug TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ai_content_filing ON ai_content(grade_slug, subject_slug, created_at);
CREATE INDEX IF NOT EXISTS idx_ai_content_license ON ai_content(license_key);
"#;

/// Apply the schema to the database.
///
/// Idempotent: all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"content_units".to_string()));
        assert!(tables.contains(&"sync_ledger".to_string()));
        assert!(tables.contains(&"outbox".to_string()));
        assert!(tables.contains(&"collection_documents".to_string()));
        assert!(tables.contains(&"ai_content".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_outbox_state_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let ok = conn.execute(
            "INSERT INTO outbox (id, method, target, enqueued_at, state)
             VALUES ('obx_1', 'PUT', 'groups/a', 0, 'rejected')",
            [],
        );
        assert!(ok.is_ok());

        let bad = conn.execute(
            "INSERT INTO outbox (id, method, target, enqueued_at, state)
             VALUES ('obx_2', 'PUT', 'groups/a', 0, 'lost')",
            [],
        );
        assert!(bad.is_err());
    }
}
