//! Connectivity monitor.
//!
//! An explicit two-state machine. The platform (or the CLI's reachability
//! probe) calls [`ConnectivityMonitor::report`]; listeners run synchronously
//! on every real transition, never on a repeated report of the same state.

use crate::notify::{Listeners, Subscription, lock};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Whether the remote backend is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    #[must_use]
    pub const fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl From<bool> for Connectivity {
    fn from(online: bool) -> Self {
        if online { Self::Online } else { Self::Offline }
    }
}

/// A change of connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Connectivity,
    pub to: Connectivity,
}

impl Transition {
    /// Offline to Online: the moment to pull and drain.
    #[must_use]
    pub const fn is_reconnect(&self) -> bool {
        matches!(
            (self.from, self.to),
            (Connectivity::Offline, Connectivity::Online)
        )
    }
}

/// Tracks online/offline state and notifies on transitions.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: Mutex<Connectivity>,
    listeners: Listeners<Transition>,
}

impl ConnectivityMonitor {
    /// Create a monitor in the state the platform reports at startup.
    #[must_use]
    pub fn new(initial: Connectivity) -> Self {
        Self {
            state: Mutex::new(initial),
            listeners: Listeners::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> Connectivity {
        *lock(&self.state)
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Feed an observed state into the machine.
    ///
    /// Returns the transition if the state changed. Listeners have already
    /// run by the time this returns.
    pub fn report(&self, observed: Connectivity) -> Option<Transition> {
        let transition = {
            let mut state = lock(&self.state);
            if *state == observed {
                return None;
            }
            let transition = Transition {
                from: *state,
                to: observed,
            };
            *state = observed;
            transition
        };

        info!(from = transition.from.as_str(), to = transition.to.as_str(), "Connectivity changed");
        self.listeners.emit(&transition);
        Some(transition)
    }

    /// Register a callback for every transition.
    pub fn on_transition<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Transition) + Send + Sync + 'static,
    {
        self.listeners.subscribe(callback)
    }
}

/// Platform connectivity signal for hosts without one: can we open a TCP
/// connection to the remote backend?
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ReachabilityProbe {
    /// Probe the host and port of a remote endpoint URL.
    ///
    /// Returns `None` if the URL has no host or no known default port.
    #[must_use]
    pub fn for_endpoint(endpoint: &reqwest::Url, timeout: Duration) -> Option<Self> {
        let host = endpoint.host_str()?.to_string();
        let port = endpoint.port_or_known_default()?;
        Some(Self { host, port, timeout })
    }

    /// Attempt one connection.
    pub async fn check(&self) -> Connectivity {
        let connect = tokio::net::TcpStream::connect((self.host.as_str(), self.port));
        match tokio::time::timeout(self.timeout, connect).await {
            Ok(Ok(_)) => Connectivity::Online,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "Probe failed");
                Connectivity::Offline
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "Probe timed out");
                Connectivity::Offline
            }
        }
    }
}
