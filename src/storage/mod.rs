//! Local store for edusync.
//!
//! Durable, always-available storage for the record kinds the sync layer
//! works with, queryable without network access:
//! - content units (replicated curriculum material)
//! - the sync ledger (which units are present and current)
//! - the outbox (writes waiting for the remote backend)
//! - mirrored collections (reference data replaced wholesale)
//! - cached AI answers
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite implementation of [`LocalStore`]

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::Result;
use crate::model::{
    AiContent, CollectionDocument, CollectionSummary, ContentUnit, LedgerEntry, OutboxEntry,
};
use crate::notify::Subscription;
use tracing::warn;

/// The record collections held by the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    Content,
    Ledger,
    Outbox,
    Collection,
    AiContent,
}

impl RecordKind {
    /// Table name backing this record kind.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Content => "content_units",
            Self::Ledger => "sync_ledger",
            Self::Outbox => "outbox",
            Self::Collection => "collection_documents",
            Self::AiContent => "ai_content",
        }
    }
}

/// Callback invoked after a committed change to a record kind.
pub type ChangeCallback = Box<dyn Fn() + Send + Sync>;

/// On-device store for every record kind.
///
/// Writes report storage errors to the caller. Implementations must be safe
/// to call concurrently for different ids and idempotent for the same id.
pub trait LocalStore: Send + Sync {
    /// Upsert a content unit by id. Last write wins.
    fn put_content_unit(&self, unit: &ContentUnit) -> Result<()>;

    /// Get a content unit by id.
    fn get_content_unit(&self, id: &str) -> Result<Option<ContentUnit>>;

    /// All units filed under a group, in no particular order.
    fn query_content_units_by_group(&self, group_id: &str) -> Result<Vec<ContentUnit>>;

    /// Number of content units held locally.
    fn count_content_units(&self) -> Result<usize>;

    /// Delete a content unit. Returns false if it did not exist.
    fn remove_content_unit(&self, id: &str) -> Result<bool>;

    /// Record that a unit is present and current, replacing any older entry.
    fn put_ledger_entry(&self, id: &str, synced_at: i64) -> Result<()>;

    /// Every ledger entry.
    fn list_ledger_entries(&self) -> Result<Vec<LedgerEntry>>;

    /// Whether the unit has been replicated.
    fn has_ledger_entry(&self, id: &str) -> Result<bool>;

    /// Forget that a unit is current, so the next pass pulls it again.
    /// Returns false if there was no entry.
    fn remove_ledger_entry(&self, id: &str) -> Result<bool>;

    /// Persist an outbox entry and return its id.
    ///
    /// An idempotent write (PUT, DELETE) supersedes the pending idempotent
    /// writes to the same target: they are dropped and the new entry goes to
    /// the tail. If the newest pending write to the target is the same
    /// request, nothing is stored and its id is returned instead.
    fn enqueue_outbox(&self, entry: &OutboxEntry) -> Result<String>;

    /// Every outbox entry in enqueue order, rejected ones included.
    fn list_outbox(&self) -> Result<Vec<OutboxEntry>>;

    /// Get an outbox entry by id.
    fn get_outbox(&self, id: &str) -> Result<Option<OutboxEntry>>;

    /// Delete an outbox entry. Returns false if it did not exist.
    fn remove_outbox(&self, id: &str) -> Result<bool>;

    /// Count a failed delivery attempt and schedule the next one.
    fn record_outbox_failure(&self, id: &str, error: &str, next_attempt_at: i64) -> Result<()>;

    /// Park an entry the backend refused. It is not sent again automatically.
    fn mark_outbox_rejected(&self, id: &str, error: &str) -> Result<()>;

    /// Return a rejected or backed-off entry to the pending queue, due now.
    fn requeue_outbox(&self, id: &str) -> Result<()>;

    /// Replace a collection's documents in one transaction. Returns how many
    /// documents were stored.
    fn replace_collection(&self, name: &str, documents: &[CollectionDocument]) -> Result<usize>;

    /// Documents of a collection, ordered by id.
    fn list_collection(&self, name: &str) -> Result<Vec<CollectionDocument>>;

    /// One document of a collection.
    fn get_collection_document(&self, name: &str, id: &str) -> Result<Option<CollectionDocument>>;

    /// Every collection held locally, ordered by name.
    fn list_collections(&self) -> Result<Vec<CollectionSummary>>;

    /// Upsert an AI answer by id.
    fn put_ai_content(&self, answer: &AiContent) -> Result<()>;

    /// Get an AI answer by id.
    fn get_ai_content(&self, id: &str) -> Result<Option<AiContent>>;

    /// Answers filed under a grade and subject, newest first.
    fn list_ai_content(&self, grade_slug: &str, subject_slug: &str) -> Result<Vec<AiContent>>;

    /// Register a callback fired after every committed change to `kind`.
    fn on_change(&self, kind: RecordKind, callback: ChangeCallback) -> Subscription;
}

/// Degrade a failed read to "no data".
///
/// Reads must never block an offline UI from rendering; the failure is logged
/// and the empty value returned.
pub fn read_or_default<T: Default>(what: &str, result: Result<T>) -> T {
    result.unwrap_or_else(|e| {
        warn!(read = what, error = %e, "Local read failed, treating as empty");
        T::default()
    })
}
