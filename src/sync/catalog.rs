//! Known remote catalog.
//!
//! The set of unit ids seen in the most recent successful fetch. Progress is
//! measured against it; before the first fetch it is unknown.

use crate::notify::{Listeners, Subscription, lock};
use std::collections::BTreeSet;
use std::sync::Mutex;

/// Unit ids from the last fetched remote catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    ids: Mutex<Option<BTreeSet<String>>>,
    listeners: Listeners<()>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog with the ids of a fresh fetch.
    pub fn replace(&self, ids: BTreeSet<String>) {
        let changed = {
            let mut current = lock(&self.ids);
            let changed = current.as_ref() != Some(&ids);
            *current = Some(ids);
            changed
        };
        if changed {
            self.listeners.emit(&());
        }
    }

    /// The catalog, or `None` if nothing has been fetched yet.
    #[must_use]
    pub fn snapshot(&self) -> Option<BTreeSet<String>> {
        lock(&self.ids).clone()
    }

    /// Number of units in the catalog (0 before the first fetch).
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.ids).as_ref().map_or(0, BTreeSet::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a callback fired whenever the catalog changes.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.subscribe(move |()| callback())
    }
}
