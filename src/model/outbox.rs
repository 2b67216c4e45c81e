//! Outbox model for edusync.
//!
//! An outbox entry is a write that could not reach the remote backend. It
//! carries everything needed to replay it standalone: method, target,
//! headers and payload. It has no foreign key into the content table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::content::ContentUnit;
use super::hash::content_hash;

/// HTTP method of a queued write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl WriteMethod {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Replaying the same request twice leaves the backend in the same state.
    #[must_use]
    pub const fn is_idempotent(&self) -> bool {
        matches!(self, Self::Put | Self::Delete)
    }
}

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxState {
    /// Waiting to be sent.
    Pending,
    /// The backend refused it. Parked until an operator requeues or discards it.
    Rejected,
}

impl OutboxState {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

impl Default for OutboxState {
    fn default() -> Self {
        Self::Pending
    }
}

/// A queued outbound write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Entry id (`obx_` prefix)
    pub id: String,

    /// Request method
    pub method: WriteMethod,

    /// Absolute URL or path relative to the remote endpoint
    pub target: String,

    /// JSON request body
    pub payload: Option<String>,

    /// Extra request headers
    pub headers: BTreeMap<String, String>,

    /// SHA-256 over method, target and payload
    pub fingerprint: String,

    /// Content unit the write replaces, when it is a unit write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<String>,

    /// Enqueue timestamp (Unix milliseconds)
    pub enqueued_at: i64,

    /// Number of failed delivery attempts
    pub attempts: u32,

    /// Earliest time a scheduled drain may retry (Unix milliseconds)
    pub next_attempt_at: i64,

    /// Message of the most recent failure
    pub last_error: Option<String>,

    /// Delivery state
    pub state: OutboxState,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    method: &'a str,
    target: &'a str,
    payload: Option<&'a str>,
}

impl OutboxEntry {
    /// Create a new pending entry.
    pub fn new(method: WriteMethod, target: impl Into<String>, payload: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("obx_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);
        let target = target.into();
        let fingerprint = content_hash(&FingerprintInput {
            method: method.as_str(),
            target: &target,
            payload: payload.as_deref(),
        });

        Self {
            id,
            method,
            target,
            payload,
            headers: BTreeMap::new(),
            fingerprint,
            unit_id: None,
            enqueued_at: now,
            attempts: 0,
            next_attempt_at: now,
            last_error: None,
            state: OutboxState::Pending,
        }
    }

    /// Add a request header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Link the entry to the content unit it writes.
    #[must_use]
    pub fn with_unit(mut self, unit_id: &str) -> Self {
        self.unit_id = Some(unit_id.to_string());
        self
    }

    /// The unit a queued unit write will leave on the backend.
    ///
    /// `None` for writes that are not linked to a unit or do not carry one.
    #[must_use]
    pub fn queued_unit(&self) -> Option<ContentUnit> {
        if self.unit_id.is_none() || self.method != WriteMethod::Put {
            return None;
        }
        self.payload
            .as_deref()
            .and_then(|payload| serde_json::from_str(payload).ok())
    }

    /// Whether a scheduled drain may send this entry at `now`.
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        self.state == OutboxState::Pending && self.next_attempt_at <= now
    }
}
