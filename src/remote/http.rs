//! HTTP gateway over a JSON document API.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET groups` lists every group with its units
//! - `GET groups/{group}` returns one group, `404` when absent
//! - `PUT groups/{group}/units/{unit}` replaces one unit
//! - `GET collections/{name}` lists the documents of a reference collection
//!
//! Ids are percent-encoded into their path segment.
//!
//! Queued writes are replayed with their recorded method, target and headers.

use crate::error::{Error, Result};
use crate::model::{ContentGroup, ContentUnit, OutboxEntry, WriteMethod};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{RemoteGateway, encode_path, unit_target};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Remote gateway backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpGateway {
    /// Create a gateway for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the endpoint is not an absolute http(s) URL
    /// or the client cannot be built.
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let base = parse_endpoint(endpoint)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Base URL all relative targets resolve against.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::InvalidArgument(format!("Invalid request target '{path}': {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, body))
    }
}

/// Parse an endpoint, making sure relative joins land underneath it.
fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let mut base = Url::parse(endpoint.trim())
        .map_err(|e| Error::Config(format!("Invalid remote endpoint '{endpoint}': {e}")))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(Error::Config(format!(
            "Remote endpoint must use http or https: {endpoint}"
        )));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

/// Failures before a response arrived are connectivity problems.
fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("Request timed out: {e}"))
    } else {
        Error::Network(format!("Request failed: {e}"))
    }
}

/// Map a non-success status to the error taxonomy.
///
/// Timeouts, throttling and server-side failures are treated as transient.
fn classify_status(status: StatusCode, body: String) -> Error {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return Error::Network(format!("Backend unavailable ({status})"));
    }

    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("request rejected").to_string()
    } else {
        body
    };
    Error::Remote {
        status: status.as_u16(),
        message,
    }
}

fn invalid_body(status: StatusCode, e: &reqwest::Error) -> Error {
    Error::Remote {
        status: status.as_u16(),
        message: format!("Malformed response body: {e}"),
    }
}

fn method_of(method: WriteMethod) -> Method {
    match method {
        WriteMethod::Post => Method::POST,
        WriteMethod::Put => Method::PUT,
        WriteMethod::Patch => Method::PATCH,
        WriteMethod::Delete => Method::DELETE,
    }
}

impl RemoteGateway for HttpGateway {
    async fn fetch_all_groups(&self) -> Result<Vec<ContentGroup>> {
        let url = self.url("groups")?;
        let response = self.execute(self.request(Method::GET, url)).await?;
        let status = response.status();
        let groups: Vec<ContentGroup> = response.json().await.map_err(|e| invalid_body(status, &e))?;
        debug!(groups = groups.len(), "Fetched remote catalog");
        Ok(groups)
    }

    async fn fetch_group(&self, group_id: &str) -> Result<Option<ContentGroup>> {
        let url = self.url(&encode_path(&["groups", group_id])?)?;
        match self.execute(self.request(Method::GET, url)).await {
            Ok(response) => {
                let status = response.status();
                let group = response.json().await.map_err(|e| invalid_body(status, &e))?;
                Ok(Some(group))
            }
            Err(Error::Remote { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_unit(&self, unit: &ContentUnit) -> Result<()> {
        let url = self.url(&unit_target(&unit.parent_group_id, &unit.id)?)?;
        self.execute(self.request(Method::PUT, url).json(unit)).await?;
        debug!(id = %unit.id, group = %unit.parent_group_id, "Unit written remotely");
        Ok(())
    }

    async fn send(&self, entry: &OutboxEntry) -> Result<()> {
        let url = self.url(&entry.target)?;
        let mut builder = self.request(method_of(entry.method), url);
        for (name, value) in &entry.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = &entry.payload {
            builder = builder.body(payload.clone());
        }
        self.execute(builder).await?;
        debug!(id = %entry.id, method = entry.method.as_str(), path = %entry.target, "Replayed write");
        Ok(())
    }

    async fn fetch_collection(&self, name: &str) -> Result<Vec<Value>> {
        let url = self.url(&encode_path(&["collections", name])?)?;
        let response = self.execute(self.request(Method::GET, url)).await?;
        let status = response.status();
        let documents: Vec<Value> = response.json().await.map_err(|e| invalid_body(status, &e))?;
        debug!(collection = name, documents = documents.len(), "Fetched remote collection");
        Ok(documents)
    }
}
