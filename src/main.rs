use hostgate::admin::{PKG_NAME, VERSION};
use hostgate::config::Config;
use hostgate::forward::ForwardConfig;
use hostgate::proxy::ProxyServer;
use hostgate::registry::{HostRegistry, HostsFileRegistry};
use hostgate::routes::RoutingTable;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path.display(), error = %e, "Failed to load configuration");
        e
    })?;

    info!(path = %config_path.display(), "Configuration loaded");

    print_startup_banner(&config);

    // Open the name registration store; failure here is fatal
    let registry = HostsFileRegistry::open(&config.tld, &config.server.hosts_path).map_err(|e| {
        error!(tld = %config.tld, path = %config.server.hosts_path, error = %e, "Failed to open name registration store");
        anyhow::anyhow!(e)
    })?;
    let registry: Arc<dyn HostRegistry> = Arc::new(registry);

    // Build the routing table; it is read-only from here on
    let table = Arc::new(RoutingTable::new(&config.targets).map_err(|e| {
        error!(error = %e, "Invalid target configuration");
        anyhow::anyhow!(e)
    })?);

    if table.is_empty() {
        warn!("No targets configured; only the admin API will respond");
    }

    // Register every configured target's subdomain so it resolves locally
    for target in table.targets() {
        registry.add_subdomain(target.subdomain()).map_err(|e| {
            error!(subdomain = target.subdomain(), error = %e, "Failed to register target subdomain");
            anyhow::anyhow!(e)
        })?;
        info!(
            subdomain = target.subdomain(),
            target = target.base_url(),
            "Target registered"
        );
    }

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.server.bind, port = config.server.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    let forward_config = ForwardConfig {
        max_idle_per_host: config.server.pool_max_idle_per_host,
        idle_timeout: config.server.pool_idle_timeout(),
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let proxy = ProxyServer::with_forward_config(
        bind_addr,
        Arc::clone(&registry),
        table,
        shutdown_rx,
        forward_config,
    );

    let proxy_handle = tokio::spawn(async move {
        if let Err(e) = proxy.run().await {
            error!(error = %e, "Proxy server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown
    let _ = shutdown_tx.send(true);

    // Wait for the server to stop (with timeout)
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), proxy_handle).await;

    // Teardown: unregister the domain and everything under it
    if let Err(e) = registry.remove_tld() {
        warn!(tld = registry.tld(), error = %e, "Failed to unregister domain");
    }

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting proxy server");
    info!(
        bind = %config.server.bind,
        port = config.server.port,
        tld = %config.tld,
        hosts_path = %config.server.hosts_path,
        "Server configuration"
    );
    info!(
        pool_max_idle = config.server.pool_max_idle_per_host,
        pool_idle_timeout_secs = config.server.pool_idle_timeout_secs,
        "Connection pool settings"
    );
    info!(
        target_count = config.targets.len(),
        targets = ?config.targets.iter().map(|t| t.subdomain.as_str()).collect::<Vec<_>>(),
        "Configured targets"
    );
}
