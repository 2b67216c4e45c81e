//! Content model for edusync.
//!
//! A content unit is one piece of curriculum material (a topic). Units live
//! inside groups on the remote backend; locally they are flattened into a
//! single table keyed by id, with the group kept as a secondary attribute.

use serde::{Deserialize, Serialize};

/// A single piece of curriculum material with a stable identity.
///
/// The wire format uses camelCase to match the remote document backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentUnit {
    /// Stable slug, unique within its parent group
    pub id: String,

    /// Display name
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: String,

    /// Rich-text body (HTML)
    #[serde(default)]
    pub body: String,

    /// Collection (category) the unit is filed under
    #[serde(default)]
    pub parent_collection_id: String,

    /// Group (subject) document that holds this unit
    #[serde(default)]
    pub parent_group_id: String,
}

impl ContentUnit {
    /// Create a unit with an empty description, body and collection.
    pub fn new(id: impl Into<String>, name: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            body: String::new(),
            parent_collection_id: String::new(),
            parent_group_id: group_id.into(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// Set the parent collection.
    #[must_use]
    pub fn with_collection(mut self, collection_id: &str) -> Self {
        self.parent_collection_id = collection_id.to_string();
        self
    }

    /// Body to persist locally.
    ///
    /// Remote documents occasionally arrive without a body; those get a
    /// placeholder so the reader never renders a blank page.
    #[must_use]
    pub fn body_or_placeholder(&self) -> String {
        if self.body.trim().is_empty() {
            format!("<p>Content for {} not found.</p>", self.name)
        } else {
            self.body.clone()
        }
    }

    /// The copy of a remote unit that is written to the local store.
    #[must_use]
    pub fn local_copy(&self) -> Self {
        Self {
            body: self.body_or_placeholder(),
            ..self.clone()
        }
    }
}

/// A remote group document and the units it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentGroup {
    pub group_id: String,
    #[serde(default)]
    pub units: Vec<ContentUnit>,
}

impl ContentGroup {
    /// Create a group from its units.
    pub fn new(group_id: impl Into<String>, units: Vec<ContentUnit>) -> Self {
        Self {
            group_id: group_id.into(),
            units,
        }
    }

    /// A unit of this group, filed under the group when it names no parent.
    #[must_use]
    pub fn unit(&self, id: &str) -> Option<ContentUnit> {
        self.units.iter().find(|u| u.id == id).map(|unit| {
            let mut unit = unit.clone();
            if unit.parent_group_id.is_empty() {
                unit.parent_group_id.clone_from(&self.group_id);
            }
            unit
        })
    }
}

/// One replicated content unit.
///
/// Exists if and only if the unit is present and current in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Content unit id
    pub id: String,

    /// When the unit was last written locally (Unix milliseconds)
    pub synced_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_wire_format_is_camel_case() {
        let unit = ContentUnit::new("fracciones", "Fracciones", "math-5")
            .with_collection("numeros");
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["parentGroupId"], "math-5");
        assert_eq!(json["parentCollectionId"], "numeros");
    }

    #[test]
    fn test_unit_missing_fields_default() {
        let unit: ContentUnit = serde_json::from_str(r#"{"id":"a","name":"A"}"#).unwrap();
        assert_eq!(unit.body, "");
        assert_eq!(unit.parent_group_id, "");
    }

    #[test]
    fn test_body_placeholder() {
        let empty = ContentUnit::new("a", "Atoms", "chem");
        assert_eq!(empty.body_or_placeholder(), "<p>Content for Atoms not found.</p>");

        let full = empty.with_body("<p>Protons</p>");
        assert_eq!(full.body_or_placeholder(), "<p>Protons</p>");
        assert_eq!(full.local_copy(), full);
    }

    #[test]
    fn test_group_unit_lookup_fills_parent() {
        let group = ContentGroup::new("chem", vec![ContentUnit::new("a", "Atoms", "")]);
        assert_eq!(group.unit("a").unwrap().parent_group_id, "chem");
        assert!(group.unit("b").is_none());
    }
}
