//! Sync context.
//!
//! Owns the components of the offline layer and wires their triggers. Built
//! once at startup and passed explicitly; nothing here is global.
//!
//! Wiring:
//! - an Offline to Online transition spawns a sync pass and a forced outbox
//!   drain, independently of each other, plus a re-mirror of the configured
//!   collections
//! - the status projection listens to the ledger, the in-flight set, the
//!   catalog and the monitor

use crate::connectivity::{Connectivity, ConnectivityMonitor};
use crate::mirror::{CollectionMirror, MirrorReport};
use crate::notify::Subscription;
use crate::outbox::{BackoffPolicy, DrainMode, OutboxReplayer};
use crate::remote::RemoteGateway;
use crate::status::StatusProjection;
use crate::storage::LocalStore;
use crate::sync::{Catalog, InFlightSet, PassReport, SyncEngine};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// The offline layer, assembled.
pub struct SyncContext<G> {
    store: Arc<dyn LocalStore>,
    gateway: Arc<G>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine<G>>,
    outbox: Arc<OutboxReplayer<G>>,
    mirror: Arc<CollectionMirror<G>>,
    collections: Arc<Vec<String>>,
    status: StatusProjection,
    _reconnect: Subscription,
    _remirror: Option<Subscription>,
}

impl<G> std::fmt::Debug for SyncContext<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("connectivity", &self.monitor.state())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<G: RemoteGateway + 'static> SyncContext<G> {
    /// Assemble the layer.
    ///
    /// Must be called from within a Tokio runtime for reconnect triggers to
    /// fire; outside one they are logged and skipped.
    pub fn new(
        store: Arc<dyn LocalStore>,
        gateway: Arc<G>,
        initial: Connectivity,
        policy: BackoffPolicy,
    ) -> Self {
        let monitor = Arc::new(ConnectivityMonitor::new(initial));
        let in_flight = Arc::new(InFlightSet::new());
        let catalog = Arc::new(Catalog::new());

        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&monitor),
            Arc::clone(&in_flight),
            Arc::clone(&catalog),
        ));
        let outbox = Arc::new(OutboxReplayer::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&monitor),
            policy,
        ));
        let mirror = Arc::new(CollectionMirror::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&monitor),
        ));
        let status = StatusProjection::new(
            Arc::clone(&store),
            in_flight,
            catalog,
            Arc::clone(&monitor),
        );

        let reconnect = Self::wire_reconnect(&monitor, &engine, &outbox);

        Self {
            store,
            gateway,
            monitor,
            engine,
            outbox,
            mirror,
            collections: Arc::new(Vec::new()),
            status,
            _reconnect: reconnect,
            _remirror: None,
        }
    }

    /// Mirror `names` again on every reconnect.
    #[must_use]
    pub fn with_collections(mut self, names: Vec<String>) -> Self {
        self.collections = Arc::new(names);
        self._remirror = (!self.collections.is_empty()).then(|| {
            let handle = Handle::try_current().ok();
            let mirror = Arc::downgrade(&self.mirror);
            let names = Arc::clone(&self.collections);
            self.monitor.on_transition(move |transition| {
                if !transition.is_reconnect() {
                    return;
                }
                let (Some(handle), Some(mirror)) = (&handle, mirror.upgrade()) else {
                    return;
                };
                let names = Arc::clone(&names);
                handle.spawn(async move {
                    if let Err(e) = mirror.mirror_all(&names).await {
                        warn!(error = %e, "Collection mirror failed");
                    }
                });
            })
        });
        self
    }

    /// Mirror every configured collection now.
    pub async fn mirror_collections(&self) -> Vec<MirrorReport> {
        match self.mirror.mirror_all(&self.collections).await {
            Ok(reports) => reports,
            Err(e) => {
                warn!(error = %e, "Collection mirror failed");
                Vec::new()
            }
        }
    }

    fn wire_reconnect(
        monitor: &ConnectivityMonitor,
        engine: &Arc<SyncEngine<G>>,
        outbox: &Arc<OutboxReplayer<G>>,
    ) -> Subscription {
        let handle = Handle::try_current().ok();
        let engine = Arc::downgrade(engine);
        let outbox = Arc::downgrade(outbox);

        monitor.on_transition(move |transition| {
            if !transition.is_reconnect() {
                return;
            }
            let Some(handle) = &handle else {
                warn!("No async runtime, reconnect triggers skipped");
                return;
            };

            debug!("Reconnected, starting sync pass and outbox drain");
            if let Some(engine) = engine.upgrade() {
                handle.spawn(async move {
                    engine.run().await;
                });
            }
            if let Some(outbox) = outbox.upgrade() {
                handle.spawn(async move {
                    if let Err(e) = outbox.drain(DrainMode::Forced).await {
                        warn!(error = %e, "Outbox drain failed");
                    }
                });
            }
        })
    }

    /// Run the startup sync pass.
    pub async fn start(&self) -> PassReport {
        self.engine.run().await
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    #[must_use]
    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<SyncEngine<G>> {
        &self.engine
    }

    #[must_use]
    pub fn outbox(&self) -> &Arc<OutboxReplayer<G>> {
        &self.outbox
    }

    #[must_use]
    pub fn mirror(&self) -> &Arc<CollectionMirror<G>> {
        &self.mirror
    }

    #[must_use]
    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    #[must_use]
    pub fn status(&self) -> &StatusProjection {
        &self.status
    }
}
