//! Pooled byte-forwarding to backend targets
//!
//! Wraps a pooled HTTP client: given a target base URL, a request is
//! rewritten to point at the backend and its response is streamed back
//! verbatim. Connections to each backend are reused across requests.

use crate::routes::Target;
use http_body_util::{combinators::BoxBody, BodyExt};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderValue;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Error type for forwarding operations
#[derive(Debug)]
pub enum ForwardError {
    /// Error from the HTTP client
    Client(hyper_util::client::legacy::Error),
    /// Error building the rewritten request
    RequestBuild(String),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Client(e) => write!(f, "Client error: {}", e),
            ForwardError::RequestBuild(s) => write!(f, "Request build error: {}", s),
        }
    }
}

impl std::error::Error for ForwardError {}

impl From<hyper_util::client::legacy::Error> for ForwardError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        ForwardError::Client(err)
    }
}

/// Configuration for the forwarding connection pool
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Maximum idle connections per backend host
    pub max_idle_per_host: usize,
    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Forwards requests to backend targets over pooled connections.
pub struct Forwarder {
    client: Client<HttpConnector, Incoming>,
    config: ForwardConfig,
}

impl Forwarder {
    pub fn new(config: ForwardConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build(connector);

        debug!(
            max_idle = config.max_idle_per_host,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Forwarding pool initialized"
        );

        Self { client, config }
    }

    pub fn config(&self) -> &ForwardConfig {
        &self.config
    }

    /// Forward a request to `target`, streaming the response back.
    ///
    /// The request URI is rebuilt against the target's base URL and the Host
    /// header is overwritten with the target's authority; everything else is
    /// passed through untouched.
    pub async fn send(
        &self,
        req: Request<Incoming>,
        target: &Target,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ForwardError> {
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = format!("{}{}", target.base_url(), path);

        let (parts, body) = req.into_parts();
        let mut builder = Request::builder().method(parts.method).uri(&uri);

        for (key, value) in parts.headers.iter() {
            builder = builder.header(key, value);
        }

        let mut backend_req = builder
            .body(body)
            .map_err(|e| ForwardError::RequestBuild(e.to_string()))?;

        // The backend must see its own authority, not the proxy's
        let authority = HeaderValue::from_str(&target.authority())
            .map_err(|e| ForwardError::RequestBuild(e.to_string()))?;
        backend_req
            .headers_mut()
            .insert(hyper::header::HOST, authority);

        let response = self.client.request(backend_req).await?;

        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, body.boxed()))
    }
}
