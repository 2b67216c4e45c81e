//! Command implementations.

pub mod ai;
pub mod collection;
pub mod completions;
pub mod content;
pub mod init;
pub mod mirror;
pub mod outbox;
pub mod status;
pub mod sync;
pub mod version;
pub mod watch;
pub mod write;

use crate::config::{EnvOverrides, ResolvedSettings, load_config, resolve_db_path};
use crate::connectivity::{Connectivity, ReachabilityProbe};
use crate::error::{Error, Result};
use crate::remote::HttpGateway;
use crate::storage::SqliteStorage;
use std::path::PathBuf;
use tracing::debug;

/// Open the database, failing with `NotInitialized` if it does not exist yet.
pub(crate) fn open_storage(db_path: Option<&PathBuf>) -> Result<SqliteStorage> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    SqliteStorage::open(&db_path)
}

/// Settings from config.json, the environment and the `--remote` flag.
pub(crate) fn settings(remote_flag: Option<&str>) -> Result<ResolvedSettings> {
    load_config()?.resolve(remote_flag, &EnvOverrides::from_env())
}

/// Build the HTTP gateway, or fail if no endpoint is configured.
pub(crate) fn gateway(settings: &ResolvedSettings) -> Result<HttpGateway> {
    let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
        Error::Config(
            "No remote endpoint configured. Pass --remote, set EDUSYNC_REMOTE, \
             or add remote.endpoint to config.json"
                .into(),
        )
    })?;
    HttpGateway::new(endpoint, settings.token.clone(), settings.timeout)
}

/// The connectivity the platform reports right now.
pub(crate) async fn probe(gateway: &HttpGateway, settings: &ResolvedSettings) -> Connectivity {
    match ReachabilityProbe::for_endpoint(gateway.endpoint(), settings.timeout) {
        Some(probe) => probe.check().await,
        None => {
            debug!(endpoint = %gateway.endpoint(), "Endpoint has no probeable host, assuming online");
            Connectivity::Online
        }
    }
}

/// Create the async runtime network commands run on.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}

/// Shorten text for table output.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}
