//! Remote gateway to the hosted document backend.
//!
//! A thin read/write facade. Only the sync engine and the outbox replayer
//! talk to it; everything else reads the local store.
//!
//! Every method fails with either [`Error::Network`] (no connectivity or a
//! timeout, retryable) or [`Error::Remote`] (the backend answered and said
//! no, never retried automatically).
//!
//! [`Error::Network`]: crate::error::Error::Network
//! [`Error::Remote`]: crate::error::Error::Remote

pub mod http;
pub mod memory;

pub use http::HttpGateway;
pub use memory::MemoryGateway;

use crate::error::{Error, Result};
use crate::model::{ContentGroup, ContentUnit, OutboxEntry, WriteMethod};
use reqwest::Url;
use serde_json::Value;
use std::future::Future;

/// Read/write capability over the remote document store.
///
/// Implemented by [`HttpGateway`] for real deployments and by
/// [`MemoryGateway`] for tests.
pub trait RemoteGateway: Send + Sync {
    /// Fetch every group with its units (full scan).
    fn fetch_all_groups(&self) -> impl Future<Output = Result<Vec<ContentGroup>>> + Send;

    /// Fetch one group. `None` if the backend has no such group.
    fn fetch_group(&self, group_id: &str) -> impl Future<Output = Result<Option<ContentGroup>>> + Send;

    /// Replace one unit inside its group.
    fn write_unit(&self, unit: &ContentUnit) -> impl Future<Output = Result<()>> + Send;

    /// Replay a queued write exactly as it was recorded.
    fn send(&self, entry: &OutboxEntry) -> impl Future<Output = Result<()>> + Send;

    /// Fetch every document of a named collection, as raw JSON objects.
    fn fetch_collection(&self, name: &str) -> impl Future<Output = Result<Vec<Value>>> + Send;
}

/// Join path segments into a relative path, percent-encoding each one.
///
/// A segment never spans more than one path component: `/`, `?`, `#` and
/// `%` inside ids are escaped.
///
/// # Errors
///
/// Returns `Error::Other` if the URL machinery refuses the segments.
pub fn encode_path(segments: &[&str]) -> Result<String> {
    let mut url = Url::parse("http://target.invalid/")
        .map_err(|e| Error::Other(format!("Failed to build request path: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| Error::Other("Failed to build request path".into()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url.path().trim_start_matches('/').to_string())
}

/// Path of a unit relative to the remote endpoint.
///
/// # Errors
///
/// See [`encode_path`].
pub fn unit_target(group_id: &str, unit_id: &str) -> Result<String> {
    encode_path(&["groups", group_id, "units", unit_id])
}

/// The request [`RemoteGateway::write_unit`] issues, as a replayable outbox entry.
///
/// # Errors
///
/// Returns an error if the unit cannot be serialized.
pub fn unit_write_request(unit: &ContentUnit) -> Result<OutboxEntry> {
    let payload = serde_json::to_string(unit)?;
    Ok(OutboxEntry::new(
        WriteMethod::Put,
        unit_target(&unit.parent_group_id, &unit.id)?,
        Some(payload),
    )
    .with_header("content-type", "application/json")
    .with_unit(&unit.id))
}
