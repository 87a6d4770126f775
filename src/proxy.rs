//! The proxy server and dispatcher
//!
//! Accepts connections, classifies each request by its effective host, and
//! either hands it to the admin control handler (host equals the registered
//! top-level domain) or forwards it to the backend target matching the
//! host's first label.

use crate::admin;
use crate::error::{json_error_response, ProxyErrorCode};
use crate::forward::{ForwardConfig, Forwarder};
use crate::registry::HostRegistry;
use crate::routes::{host_label, RoutingTable};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderValue;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Header name for request ID
const X_REQUEST_ID: &str = "x-request-id";
/// Header name for forwarded-for
const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Header name for forwarded host
const X_FORWARDED_HOST: &str = "x-forwarded-host";
/// Header name for forwarded proto
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// The main reverse proxy server
pub struct ProxyServer {
    bind_addr: SocketAddr,
    registry: Arc<dyn HostRegistry>,
    table: Arc<RoutingTable>,
    forwarder: Arc<Forwarder>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ProxyServer {
    pub fn new(
        bind_addr: SocketAddr,
        registry: Arc<dyn HostRegistry>,
        table: Arc<RoutingTable>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self::with_forward_config(
            bind_addr,
            registry,
            table,
            shutdown_rx,
            ForwardConfig::default(),
        )
    }

    pub fn with_forward_config(
        bind_addr: SocketAddr,
        registry: Arc<dyn HostRegistry>,
        table: Arc<RoutingTable>,
        shutdown_rx: watch::Receiver<bool>,
        forward_config: ForwardConfig,
    ) -> Self {
        Self {
            bind_addr,
            registry,
            table,
            forwarder: Arc::new(Forwarder::new(forward_config)),
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(
            addr = %self.bind_addr,
            tld = self.registry.tld(),
            targets = self.table.targets().len(),
            pool_max_idle = self.forwarder.config().max_idle_per_host,
            pool_idle_timeout_secs = self.forwarder.config().idle_timeout.as_secs(),
            "Proxy server listening (HTTP/1.1 and HTTP/2)"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let registry = Arc::clone(&self.registry);
                            let table = Arc::clone(&self.table);
                            let forwarder = Arc::clone(&self.forwarder);

                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, registry, table, forwarder).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Proxy server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    addr: SocketAddr,
    registry: Arc<dyn HostRegistry>,
    table: Arc<RoutingTable>,
    forwarder: Arc<Forwarder>,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let registry = Arc::clone(&registry);
        let table = Arc::clone(&table);
        let forwarder = Arc::clone(&forwarder);
        async move { handle_request(req, registry, table, forwarder, addr).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .http1()
        .preserve_header_case(true)
        .http2()
        .max_concurrent_streams(250)
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    mut req: Request<Incoming>,
    registry: Arc<dyn HostRegistry>,
    table: Arc<RoutingTable>,
    forwarder: Arc<Forwarder>,
    client_addr: SocketAddr,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    // Generate or propagate request ID
    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Classification happens on the effective host before any header rewriting
    let hostname = match effective_host(&req) {
        Some(h) => h,
        None => {
            return Ok(json_error_response(
                ProxyErrorCode::MissingHostHeader,
                "Missing or invalid Host header",
            ));
        }
    };

    debug!(hostname, method = %req.method(), uri = %req.uri(), request_id, "Incoming request");

    // The registered domain itself selects the admin control handler
    if hostname == registry.tld() {
        return Ok(admin::handle_admin(req, registry.as_ref()).await);
    }

    let label = host_label(&hostname);
    let target = match table.lookup(label) {
        Some(target) => target.clone(),
        None => {
            debug!(hostname, label, request_id, "No target for subdomain");
            return Ok(json_error_response(
                ProxyErrorCode::NoRouteMatch,
                format!("No target for subdomain {}", label),
            ));
        }
    };

    // Add proxy headers
    // Security: X-Forwarded-* headers are overwritten rather than appended to
    // prevent client spoofing. This proxy is assumed to be the first trusted hop.
    let headers = req.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(X_REQUEST_ID, value);
    }

    if let Ok(value) = HeaderValue::from_str(&client_addr.ip().to_string()) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    if let Some(host) = headers.get(hyper::header::HOST).cloned() {
        headers.insert(X_FORWARDED_HOST, host);
    }

    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

    match forwarder.send(req, &target).await {
        Ok(response) => Ok(response),
        Err(e) => {
            // Log detailed error internally, return generic message externally
            error!(
                hostname,
                target = target.base_url(),
                request_id,
                error = %e,
                "Failed to forward request"
            );
            Ok(json_error_response(
                ProxyErrorCode::UpstreamUnreachable,
                "Failed to connect to backend",
            ))
        }
    }
}

/// Maximum hostname length per DNS specification
const MAX_HOSTNAME_LEN: usize = 253;

/// Extract the effective host of a request.
///
/// A forwarded-host indicator wins over the request's own host so the proxy
/// classifies correctly behind another proxy; any port suffix is stripped
/// before comparison.
fn effective_host<B>(req: &Request<B>) -> Option<String> {
    let raw = req
        .headers()
        .get(X_FORWARDED_HOST)
        .or_else(|| req.headers().get(hyper::header::HOST))
        .and_then(|h| h.to_str().ok())
        .map(String::from)
        .or_else(|| req.uri().host().map(String::from))?;

    // Strip port if present
    let hostname = raw.split(':').next()?;

    // Validate length (DNS max is 253 characters)
    if hostname.is_empty() || hostname.len() > MAX_HOSTNAME_LEN {
        return None;
    }

    // Validate characters: alphanumeric, hyphen, and dot only
    // This prevents log injection and other attacks
    if !hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return None;
    }

    Some(hostname.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn request_with_headers(headers: &[(&str, &str)]) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(Bytes::new())).expect("valid request")
    }

    #[test]
    fn test_effective_host_strips_port() {
        let req = request_with_headers(&[("host", "example.com:8080")]);
        assert_eq!(effective_host(&req).unwrap(), "example.com");
    }

    #[test]
    fn test_forwarded_host_takes_precedence() {
        let req = request_with_headers(&[
            ("host", "proxy.internal"),
            ("x-forwarded-host", "app.example.com"),
        ]);
        assert_eq!(effective_host(&req).unwrap(), "app.example.com");
    }

    #[test]
    fn test_forwarded_host_port_also_stripped() {
        let req = request_with_headers(&[("x-forwarded-host", "example.com:443")]);
        assert_eq!(effective_host(&req).unwrap(), "example.com");
    }

    #[test]
    fn test_effective_host_lowercases() {
        let req = request_with_headers(&[("host", "App.Example.COM")]);
        assert_eq!(effective_host(&req).unwrap(), "app.example.com");
    }

    #[test]
    fn test_missing_host_is_none() {
        let req = request_with_headers(&[]);
        assert_eq!(effective_host(&req), None);
    }

    #[test]
    fn test_invalid_host_is_rejected() {
        let req = request_with_headers(&[("host", "under_score.example.com")]);
        assert_eq!(effective_host(&req), None);

        let long = "a".repeat(254);
        let req = request_with_headers(&[("host", long.as_str())]);
        assert_eq!(effective_host(&req), None);
    }

    #[test]
    fn test_admin_classification_ignores_port() {
        let tld = "example.com";
        let req = request_with_headers(&[("host", "example.com:8080")]);
        assert_eq!(effective_host(&req).unwrap(), tld);

        let req = request_with_headers(&[("host", "app.example.com:8080")]);
        assert_ne!(effective_host(&req).unwrap(), tld);
    }
}
