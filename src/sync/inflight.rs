//! In-flight set.
//!
//! Process-only set of content unit ids currently being written. Drives the
//! "syncing" indicator; nothing here is persisted.

use crate::notify::{Listeners, Subscription, lock};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Ids of units currently being replicated.
#[derive(Debug, Default)]
pub struct InFlightSet {
    ids: Mutex<BTreeSet<String>>,
    listeners: Listeners<usize>,
}

impl InFlightSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` in flight until the returned guard is dropped.
    pub fn track(&self, id: &str) -> InFlightGuard<'_> {
        self.insert(id);
        InFlightGuard {
            set: self,
            id: id.to_string(),
        }
    }

    fn insert(&self, id: &str) {
        let len = {
            let mut ids = lock(&self.ids);
            if !ids.insert(id.to_string()) {
                return;
            }
            ids.len()
        };
        self.listeners.emit(&len);
    }

    fn remove(&self, id: &str) {
        let len = {
            let mut ids = lock(&self.ids);
            if !ids.remove(id) {
                return;
            }
            ids.len()
        };
        self.listeners.emit(&len);
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.ids).contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.ids).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.ids).is_empty()
    }

    /// Register a callback receiving the new size after every change.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&usize) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }
}

/// Removes its id from the set on drop, whether the write succeeded or not.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}
