//! Collection mirror.
//!
//! Reference collections (licenses, subjects, users...) are small and change
//! as a whole, so they are not reconciled unit by unit like content. A mirror
//! fetches the full remote collection and replaces the local copy in one
//! transaction: documents deleted remotely disappear locally too.
//!
//! Failures never propagate to readers. Offline, the mirror does nothing and
//! the previous local copy stays readable; a failed fetch is logged and the
//! local copy is left untouched.

use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::model::{CollectionDocument, is_valid_collection_name};
use crate::remote::RemoteGateway;
use crate::storage::LocalStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a mirror ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum MirrorOutcome {
    /// The local copy now equals the remote collection.
    Replaced,
    /// The monitor reported offline; the local copy is unchanged.
    SkippedOffline,
    /// The remote collection could not be fetched.
    FetchFailed(String),
    /// The fetched documents could not be stored.
    StoreFailed(String),
}

/// Result of mirroring one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub collection: String,
    pub outcome: MirrorOutcome,
    /// Documents now held locally for the collection
    pub stored: usize,
    /// Remote documents dropped for lack of an id
    pub skipped: usize,
}

impl MirrorReport {
    fn new(collection: &str, outcome: MirrorOutcome) -> Self {
        Self {
            collection: collection.to_string(),
            outcome,
            stored: 0,
            skipped: 0,
        }
    }

    /// Whether the mirror reached the remote and stored its answer.
    #[must_use]
    pub fn is_replaced(&self) -> bool {
        self.outcome == MirrorOutcome::Replaced
    }
}

/// Mirrors named remote collections into the local store.
pub struct CollectionMirror<G> {
    store: Arc<dyn LocalStore>,
    gateway: Arc<G>,
    monitor: Arc<ConnectivityMonitor>,
}

impl<G> std::fmt::Debug for CollectionMirror<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionMirror")
            .field("connectivity", &self.monitor.state())
            .finish_non_exhaustive()
    }
}

impl<G: RemoteGateway> CollectionMirror<G> {
    pub fn new(
        store: Arc<dyn LocalStore>,
        gateway: Arc<G>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            gateway,
            monitor,
        }
    }

    /// Replace the local copy of `name` with the remote collection.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `name` is not a plain identifier.
    /// Connectivity and storage problems are reported in the outcome instead.
    pub async fn mirror(&self, name: &str) -> Result<MirrorReport> {
        if !is_valid_collection_name(name) {
            return Err(Error::InvalidArgument(format!(
                "collection names are letters, digits, '_' and '-': '{name}'"
            )));
        }

        if !self.monitor.is_online() {
            debug!(collection = name, "Offline, keeping local copy");
            return Ok(MirrorReport::new(name, MirrorOutcome::SkippedOffline));
        }

        let fetched = match self.gateway.fetch_collection(name).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(collection = name, error = %e, "Failed to fetch collection");
                return Ok(MirrorReport::new(name, MirrorOutcome::FetchFailed(e.to_string())));
            }
        };

        let total = fetched.len();
        let documents: Vec<CollectionDocument> = fetched
            .into_iter()
            .filter_map(CollectionDocument::from_remote)
            .collect();
        let skipped = total - documents.len();
        if skipped > 0 {
            warn!(collection = name, skipped, "Documents without an id were not stored");
        }

        match self.store.replace_collection(name, &documents) {
            Ok(stored) => {
                info!(collection = name, stored, "Collection mirrored");
                Ok(MirrorReport {
                    stored,
                    skipped,
                    ..MirrorReport::new(name, MirrorOutcome::Replaced)
                })
            }
            Err(e) => {
                warn!(collection = name, error = %e, "Failed to store collection");
                Ok(MirrorReport::new(name, MirrorOutcome::StoreFailed(e.to_string())))
            }
        }
    }

    /// Mirror several collections one after another.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` on the first invalid name, before
    /// anything is fetched.
    pub async fn mirror_all(&self, names: &[String]) -> Result<Vec<MirrorReport>> {
        if let Some(bad) = names.iter().find(|n| !is_valid_collection_name(n)) {
            return Err(Error::InvalidArgument(format!("invalid collection name: '{bad}'")));
        }

        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            reports.push(self.mirror(name).await?);
        }
        Ok(reports)
    }
}
