use crate::routes::TargetConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Global configuration for the proxy
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Top-level domain this proxy instance owns and intercepts for admin
    /// control (e.g. "example.com")
    pub tld: String,

    /// Static backend targets, one per subdomain
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Listen port (default: 80)
    #[serde(default = "default_listen_port")]
    pub port: u16,

    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Path to the name registration store (default: /etc/hosts)
    #[serde(default = "default_hosts_path")]
    pub hosts_path: String,

    /// Maximum idle connections per backend host (default: 10)
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    /// Idle connection timeout in seconds (default: 90)
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

impl ServerConfig {
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_listen_port(),
            bind: default_bind_address(),
            hosts_path: default_hosts_path(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

fn default_listen_port() -> u16 {
    80
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_hosts_path() -> String {
    "/etc/hosts".to_string()
}

fn default_pool_max_idle_per_host() -> usize {
    10
}

fn default_pool_idle_timeout() -> u64 {
    90
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let tld = self.tld.trim();
        if tld.is_empty() {
            anyhow::bail!("'tld' must not be empty");
        }
        if !tld
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        {
            anyhow::bail!("'tld' contains invalid characters: {:?}", self.tld);
        }

        // Duplicate or malformed subdomains are caught again by the routing
        // table; reporting them here gives a configuration-shaped error
        let mut seen: Vec<&str> = Vec::new();
        for target in &self.targets {
            let subdomain = target.subdomain.trim();
            if subdomain.is_empty() {
                anyhow::bail!("target with empty 'subdomain'");
            }
            if seen.contains(&subdomain) {
                anyhow::bail!("duplicate target subdomain: {}", subdomain);
            }
            seen.push(subdomain);
        }

        Ok(())
    }
}
