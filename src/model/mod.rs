//! Data models for edusync.
//!
//! This module contains the domain records held by the local store:
//! - ContentUnit / ContentGroup
//! - LedgerEntry
//! - OutboxEntry
//! - CollectionDocument (mirrored reference data)
//! - AiContent (cached AI answers)

pub mod ai;
pub mod collection;
pub mod content;
pub mod hash;
pub mod outbox;

pub use ai::AiContent;
pub use collection::{CollectionDocument, CollectionSummary, is_valid_collection_name};
pub use content::{ContentGroup, ContentUnit, LedgerEntry};
pub use hash::{content_hash, short_hash};
pub use outbox::{OutboxEntry, OutboxState, WriteMethod};
