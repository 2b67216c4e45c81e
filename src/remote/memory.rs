//! In-memory gateway.
//!
//! Holds groups in a map and records every request the "backend" accepted.
//! It can be switched offline and told to reject writes, which is enough to
//! drive the sync engine and outbox through every failure class.

use crate::error::{Error, Result};
use crate::model::{ContentGroup, ContentUnit, OutboxEntry, WriteMethod};
use crate::notify::lock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::RemoteGateway;

/// A request the in-memory backend accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    FetchAllGroups,
    FetchGroup(String),
    FetchCollection(String),
    WriteUnit(ContentUnit),
    Send {
        method: WriteMethod,
        target: String,
        payload: Option<String>,
    },
}

#[derive(Debug, Default)]
struct Backend {
    groups: BTreeMap<String, Vec<ContentUnit>>,
    collections: BTreeMap<String, Vec<Value>>,
    calls: Vec<RemoteCall>,
    reject_status: Option<u16>,
}

/// Remote gateway over an in-process map.
#[derive(Debug)]
pub struct MemoryGateway {
    backend: Mutex<Backend>,
    online: AtomicBool,
    attempts: AtomicUsize,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    /// Create an empty, reachable backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: Mutex::new(Backend::default()),
            online: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Replace a group's units. Units get the group id as their parent.
    pub fn set_group(&self, group_id: &str, units: Vec<ContentUnit>) {
        let units = units
            .into_iter()
            .map(|mut unit| {
                unit.parent_group_id = group_id.to_string();
                unit
            })
            .collect();
        lock(&self.backend).groups.insert(group_id.to_string(), units);
    }

    /// Replace a collection's documents.
    pub fn set_collection(&self, name: &str, documents: Vec<Value>) {
        lock(&self.backend)
            .collections
            .insert(name.to_string(), documents);
    }

    /// Current copy of a unit, if the backend has it.
    #[must_use]
    pub fn unit(&self, group_id: &str, unit_id: &str) -> Option<ContentUnit> {
        lock(&self.backend)
            .groups
            .get(group_id)
            .and_then(|units| units.iter().find(|u| u.id == unit_id).cloned())
    }

    /// Make every request fail with a network error (or succeed again).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Reject every write with the given status; `None` accepts writes again.
    pub fn reject_writes(&self, status: Option<u16>) {
        lock(&self.backend).reject_status = status;
    }

    /// Requests the backend accepted, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.backend).calls.clone()
    }

    /// Accepted write requests (`write_unit` and `send`).
    #[must_use]
    pub fn writes(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, RemoteCall::WriteUnit(_) | RemoteCall::Send { .. }))
            .collect()
    }

    /// Every request made, failed ones included.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn reachable(&self) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Network("remote unreachable".into()))
        }
    }

    fn accept_write(backend: &Backend) -> Result<()> {
        match backend.reject_status {
            Some(status) => Err(Error::Remote {
                status,
                message: "write rejected".into(),
            }),
            None => Ok(()),
        }
    }

    fn upsert(backend: &mut Backend, unit: ContentUnit) {
        let units = backend.groups.entry(unit.parent_group_id.clone()).or_default();
        match units.iter_mut().find(|u| u.id == unit.id) {
            Some(existing) => *existing = unit,
            None => units.push(unit),
        }
    }
}

impl RemoteGateway for MemoryGateway {
    async fn fetch_all_groups(&self) -> Result<Vec<ContentGroup>> {
        self.reachable()?;
        // Suspend like a real request would, so concurrent triggers interleave.
        tokio::task::yield_now().await;

        let mut backend = lock(&self.backend);
        backend.calls.push(RemoteCall::FetchAllGroups);
        Ok(backend
            .groups
            .iter()
            .map(|(id, units)| ContentGroup::new(id.clone(), units.clone()))
            .collect())
    }

    async fn fetch_group(&self, group_id: &str) -> Result<Option<ContentGroup>> {
        self.reachable()?;
        let mut backend = lock(&self.backend);
        backend.calls.push(RemoteCall::FetchGroup(group_id.to_string()));
        Ok(backend
            .groups
            .get(group_id)
            .map(|units| ContentGroup::new(group_id, units.clone())))
    }

    async fn write_unit(&self, unit: &ContentUnit) -> Result<()> {
        self.reachable()?;
        let mut backend = lock(&self.backend);
        Self::accept_write(&backend)?;
        backend.calls.push(RemoteCall::WriteUnit(unit.clone()));
        Self::upsert(&mut backend, unit.clone());
        Ok(())
    }

    async fn send(&self, entry: &OutboxEntry) -> Result<()> {
        self.reachable()?;
        let mut backend = lock(&self.backend);
        Self::accept_write(&backend)?;
        backend.calls.push(RemoteCall::Send {
            method: entry.method,
            target: entry.target.clone(),
            payload: entry.payload.clone(),
        });

        if entry.method == WriteMethod::Put {
            if let Some(unit) = entry
                .payload
                .as_deref()
                .and_then(|p| serde_json::from_str::<ContentUnit>(p).ok())
            {
                Self::upsert(&mut backend, unit);
            }
        }
        Ok(())
    }

    async fn fetch_collection(&self, name: &str) -> Result<Vec<Value>> {
        self.reachable()?;
        tokio::task::yield_now().await;

        let mut backend = lock(&self.backend);
        backend.calls.push(RemoteCall::FetchCollection(name.to_string()));
        Ok(backend.collections.get(name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::unit_write_request;

    #[tokio::test]
    async fn test_fetch_returns_groups() {
        let gateway = MemoryGateway::new();
        gateway.set_group("a", vec![ContentUnit::new("u1", "U1", "")]);

        let groups = gateway.fetch_all_groups().await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].units[0].parent_group_id, "a");
        assert!(gateway.fetch_group("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_collection() {
        let gateway = MemoryGateway::new();
        gateway.set_collection("licenses", vec![serde_json::json!({"id": "l1"})]);

        assert_eq!(gateway.fetch_collection("licenses").await.unwrap().len(), 1);
        assert!(gateway.fetch_collection("subjects").await.unwrap().is_empty());
        assert_eq!(
            gateway.calls()[0],
            RemoteCall::FetchCollection("licenses".into())
        );
    }

    #[tokio::test]
    async fn test_offline_fails_with_network() {
        let gateway = MemoryGateway::new();
        gateway.set_online(false);
        let err = gateway.fetch_all_groups().await.unwrap_err();
        assert!(err.is_network());
        assert!(gateway.calls().is_empty());
        assert_eq!(gateway.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_writes_are_remote_errors() {
        let gateway = MemoryGateway::new();
        gateway.reject_writes(Some(422));
        let err = gateway
            .write_unit(&ContentUnit::new("u1", "U1", "a"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { status: 422, .. }));
        assert!(gateway.writes().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_put_applies_unit() {
        let gateway = MemoryGateway::new();
        let unit = ContentUnit::new("u1", "U1", "a").with_body("<p>new</p>");
        gateway.send(&unit_write_request(&unit).unwrap()).await.unwrap();
        assert_eq!(gateway.unit("a", "u1"), Some(unit));
    }
}
