//! Mirrored collections.
//!
//! Reference data such as licenses or subjects is mirrored wholesale: every
//! mirror clears the local copy of a collection and replaces it with what
//! the remote returned. Documents are kept as opaque JSON keyed by `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One document of a mirrored collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDocument {
    pub id: String,
    pub data: Value,
}

impl CollectionDocument {
    /// Wrap a remote document.
    ///
    /// Returns `None` when the document has no usable `id` field. String and
    /// integer ids are accepted.
    #[must_use]
    pub fn from_remote(data: Value) -> Option<Self> {
        let id = match data.get("id")? {
            Value::String(id) if !id.trim().is_empty() => id.clone(),
            Value::Number(n) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => return None,
        };
        Some(Self { id, data })
    }
}

/// A locally mirrored collection and its size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub name: String,
    pub documents: usize,
    /// When the collection was last replaced (Unix milliseconds)
    pub mirrored_at: i64,
}

/// Collection names are plain identifiers: ASCII letters, digits, `_` and `-`.
#[must_use]
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
