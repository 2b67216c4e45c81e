//! Cached AI answers.
//!
//! Answers generated for a reader's question are kept on the device so they
//! can be re-read offline, filed under the grade and subject they belong to.

use serde::{Deserialize, Serialize};

/// One generated answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiContent {
    /// Entry id (`ai_` prefix)
    pub id: String,

    /// License the question was asked under
    #[serde(default)]
    pub license_key: String,

    /// The question as asked
    pub query: String,

    /// The generated answer (Markdown)
    pub content: String,

    pub grade_slug: String,
    pub subject_slug: String,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl AiContent {
    /// Create an answer stamped now.
    pub fn new(
        query: impl Into<String>,
        content: impl Into<String>,
        grade_slug: impl Into<String>,
        subject_slug: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("ai_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            license_key: String::new(),
            query: query.into(),
            content: content.into(),
            grade_slug: grade_slug.into(),
            subject_slug: subject_slug.into(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Set the license key.
    #[must_use]
    pub fn with_license(mut self, license_key: &str) -> Self {
        self.license_key = license_key.to_string();
        self
    }
}
