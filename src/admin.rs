//! Admin control handler
//!
//! A small request/response protocol for mutating the name registration
//! store, reachable only through the registered top-level domain's own host
//! header. Routing targets are static; these operations change name
//! resolution only.

use crate::registry::HostRegistry;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

/// Version information for the proxy
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Helper to create a plain-text response - infallible with valid StatusCode
fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<BoxBody<Bytes, hyper::Error>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(
            Full::new(body.into())
                .map_err(|never| match never {})
                .boxed(),
        )
        .expect("valid response with StatusCode enum and static header")
}

fn bad_request(message: impl std::fmt::Display) -> Response<BoxBody<Bytes, hyper::Error>> {
    response(StatusCode::BAD_REQUEST, format!("bad request: {}", message))
}

/// Admin request body for add/remove operations
#[derive(Debug, Deserialize)]
struct SubdomainRequest {
    // Some clients capitalize the field name
    #[serde(alias = "Subdomain")]
    subdomain: String,
}

/// Handle one admin API request.
///
/// The request body is always fully consumed, whatever the outcome.
pub async fn handle_admin<B>(
    req: Request<B>,
    registry: &dyn HostRegistry,
) -> Response<BoxBody<Bytes, hyper::Error>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!(%method, %path, "Admin API request");

    match (&method, path.as_str()) {
        (&Method::POST, "/add") => match decode_subdomain(req).await {
            Ok(subdomain) => match registry.add_subdomain(&subdomain) {
                Ok(()) => response(StatusCode::OK, ""),
                Err(e) => {
                    warn!(subdomain, error = %e, "Admin add failed");
                    bad_request(e)
                }
            },
            Err(message) => bad_request(message),
        },
        (&Method::POST, "/remove") => match decode_subdomain(req).await {
            Ok(subdomain) => match registry.remove_subdomain(&subdomain) {
                Ok(()) => response(StatusCode::OK, ""),
                Err(e) => {
                    warn!(subdomain, error = %e, "Admin remove failed");
                    bad_request(e)
                }
            },
            Err(message) => bad_request(message),
        },
        (&Method::GET, "/list") => {
            let mut body = String::new();
            for host in registry.list_subdomains() {
                body.push_str(&host);
                body.push('\n');
            }
            response(StatusCode::OK, body)
        }
        _ => response(StatusCode::NOT_FOUND, "not found"),
    }
}

/// Consume the request body and decode the subdomain out of it.
async fn decode_subdomain<B>(req: Request<B>) -> Result<String, String>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let bytes = req
        .into_body()
        .collect()
        .await
        .map_err(|e| e.to_string())?
        .to_bytes();

    let ask: SubdomainRequest = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    Ok(ask.subdomain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use http_body_util::Empty;

    fn json_request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .expect("valid request")
    }

    async fn body_text(response: Response<BoxBody<Bytes, hyper::Error>>) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn test_add_registers_subdomain() {
        let registry = MemoryRegistry::new("example.com");
        let req = json_request(Method::POST, "/add", r#"{"subdomain":"new"}"#);

        let res = handle_admin(req, &registry).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "");

        assert!(registry
            .list_subdomains()
            .contains(&"new.example.com".to_string()));
    }

    #[tokio::test]
    async fn test_remove_unregisters_subdomain() {
        let registry = MemoryRegistry::new("example.com");
        registry.add_subdomain("old").expect("seed subdomain");

        let req = json_request(Method::POST, "/remove", r#"{"subdomain":"old"}"#);
        let res = handle_admin(req, &registry).await;
        assert_eq!(res.status(), StatusCode::OK);

        assert!(!registry
            .list_subdomains()
            .contains(&"old.example.com".to_string()));
    }

    #[tokio::test]
    async fn test_list_is_newline_delimited() {
        let registry = MemoryRegistry::new("example.com");
        registry.add_subdomain("app").expect("seed subdomain");

        let req = Request::builder()
            .method(Method::GET)
            .uri("/list")
            .body(Empty::<Bytes>::new())
            .expect("valid request");

        let res = handle_admin(req, &registry).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = body_text(res).await;
        let hosts: Vec<&str> = body.lines().collect();
        assert!(hosts.contains(&"example.com"));
        assert!(hosts.contains(&"app.example.com"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let registry = MemoryRegistry::new("example.com");
        let req = json_request(Method::POST, "/add", "{not json");

        let res = handle_admin(req, &registry).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(res).await.starts_with("bad request: "));
    }

    #[tokio::test]
    async fn test_capitalized_field_name_accepted() {
        let registry = MemoryRegistry::new("example.com");

        let req = json_request(Method::POST, "/add", r#"{"Subdomain":"alias"}"#);
        let res = handle_admin(req, &registry).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(registry
            .list_subdomains()
            .contains(&"alias.example.com".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let registry = MemoryRegistry::new("example.com");

        let req = json_request(Method::POST, "/list", "");
        let res = handle_admin(req, &registry).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(res).await, "not found");

        let req = json_request(Method::GET, "/add", "");
        let res = handle_admin(req, &registry).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
