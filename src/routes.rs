//! Static routing table
//!
//! Built once from configuration at startup and read-only afterwards. Each
//! [`Target`] is one backend reachable under one subdomain label; dispatch
//! is a linear scan over the table, first match wins.

use serde::Deserialize;
use thiserror::Error;

/// Error type for routing table construction
#[derive(Debug, Error)]
pub enum RouteError {
    /// Two targets claim the same subdomain
    #[error("duplicate subdomain in target configuration: {0}")]
    DuplicateSubdomain(String),
    /// The subdomain is empty or not a single label
    #[error("invalid subdomain label: {0:?}")]
    InvalidSubdomain(String),
}

/// One backend target as declared in configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Subdomain label this target is reachable under
    pub subdomain: String,

    /// Backend host (default: localhost)
    #[serde(default = "default_target_host")]
    pub host: String,

    /// Backend port (default: 80)
    #[serde(default = "default_target_port")]
    pub port: u16,

    /// Force https to the backend regardless of port
    #[serde(default)]
    pub secure: bool,
}

fn default_target_host() -> String {
    "localhost".to_string()
}

fn default_target_port() -> u16 {
    80
}

impl TargetConfig {
    fn is_secure(&self) -> bool {
        self.secure || self.port == 443
    }
}

/// URL scheme for a backend target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A resolved backend target. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Target {
    subdomain: String,
    scheme: Scheme,
    host: String,
    port: u16,
    base_url: String,
}

impl Target {
    fn from_config(config: &TargetConfig) -> Result<Self, RouteError> {
        let subdomain = config.subdomain.trim().to_ascii_lowercase();
        if subdomain.is_empty() || subdomain.contains('.') {
            return Err(RouteError::InvalidSubdomain(config.subdomain.clone()));
        }

        let scheme = if config.is_secure() {
            Scheme::Https
        } else {
            Scheme::Http
        };

        // Elide the port when it is the scheme default
        let base_url = if config.port == scheme.default_port() {
            format!("{}://{}", scheme.as_str(), config.host)
        } else {
            format!("{}://{}:{}", scheme.as_str(), config.host, config.port)
        };

        Ok(Self {
            subdomain,
            scheme,
            host: config.host.clone(),
            port: config.port,
            base_url,
        })
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL of the backend, e.g. `http://localhost:8000`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The authority to place in the forwarded Host header.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Ordered set of targets, keyed by subdomain label.
#[derive(Debug)]
pub struct RoutingTable {
    targets: Vec<Target>,
}

impl RoutingTable {
    /// Build the table from configuration. Duplicate subdomains are a
    /// configuration error.
    pub fn new(configs: &[TargetConfig]) -> Result<Self, RouteError> {
        let mut targets: Vec<Target> = Vec::with_capacity(configs.len());
        for config in configs {
            let target = Target::from_config(config)?;
            if targets.iter().any(|t| t.subdomain == target.subdomain) {
                return Err(RouteError::DuplicateSubdomain(target.subdomain));
            }
            targets.push(target);
        }
        Ok(Self { targets })
    }

    /// Find the target for a subdomain label. First match wins.
    pub fn lookup(&self, label: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.subdomain == label)
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Routing key of a hostname: the text before the first separator.
pub fn host_label(host: &str) -> &str {
    match host.split_once('.') {
        Some((label, _)) => label,
        None => host,
    }
}
