//! beaconstats Client Daemon
//!
//! Watches one beacon node and keeps an eth2stats server informed:
//! - Registers the node and persists the issued session token
//! - Forwards chain head changes, rate limited
//! - Sends heartbeats and changed telemetry values
//! - Reports its own health via an optional Prometheus endpoint

use beaconstats_adapters::{build_source, MemoryWatcher};
use beaconstats_client::{
    ClientConfig, ConfigOverrides, GrpcStatsServer, HealthState, MetricsServer,
    SessionManager, SessionSettings, SessionToken, TokenStore,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beaconstats-client")]
#[command(about = "Reports a beacon node's chain head and health to an eth2stats server")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Stats server address (overrides config file)
    #[arg(long)]
    server_addr: Option<String>,

    /// Name the node is listed under (overrides config file)
    #[arg(long)]
    node_name: Option<String>,

    /// Beacon node type: v1, lighthouse, teku, lodestar or nimbus (overrides config file)
    #[arg(long)]
    beacon_kind: Option<String>,

    /// Beacon node REST API URL (overrides config file)
    #[arg(long)]
    beacon_addr: Option<String>,

    /// Beacon node Prometheus metrics URL (overrides config file)
    #[arg(long)]
    beacon_metrics_addr: Option<String>,

    /// Folder holding the session token (overrides config file)
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// Connect to the stats server without TLS
    #[arg(long)]
    insecure: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable trace logging
    #[arg(long)]
    trace: bool,

    /// Log filter directive, e.g. "beaconstats_client=debug"
    #[arg(long)]
    log_filter: Option<String>,

    /// Remove the stored session token and exit
    #[arg(long)]
    clear_token: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            server_addr: self.server_addr.clone(),
            node_name: self.node_name.clone(),
            beacon_kind: self.beacon_kind.clone(),
            beacon_addr: self.beacon_addr.clone(),
            beacon_metrics_addr: self.beacon_metrics_addr.clone(),
            data_folder: self.data_folder.clone(),
            insecure: self.insecure,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if let Some(directive) = &self.log_filter {
            return EnvFilter::new(directive);
        }
        let level = if self.trace {
            tracing::Level::TRACE
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };
        EnvFilter::from_default_env().add_directive(level.into())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(cli.env_filter())
        .init();

    // Priority: CLI args > environment > config.toml > defaults
    let config = ClientConfig::load_or_default(&cli.config)
        .with_overrides(cli.overrides())
        .with_env_overrides();

    if cli.clear_token {
        let store = TokenStore::new(config.token_path());
        if store.clear()? {
            println!("Session token removed from {:?}", store.path());
        } else {
            println!("No session token found at {:?}", store.path());
        }
        return Ok(());
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        return Err(e.into());
    }

    info!(
        node_name = %config.server.node_name,
        server = %config.server.endpoint_uri(),
        beacon_kind = %config.beacon.kind,
        beacon_addr = %config.beacon.address,
        data_folder = ?config.data.folder,
        "Configuration loaded"
    );

    let health_state = Arc::new(RwLock::new(HealthState::default()));

    if config.metrics.enabled {
        // Installs the recorder, then registers the metric descriptions
        let metrics_server = MetricsServer::new(config.metrics.port)
            .map_err(|e| anyhow::anyhow!("Failed to create metrics server: {}", e))?;
        let health_path = config.metrics.health_path.clone();
        let metrics_path = config.metrics.metrics_path.clone();
        let health_state_clone = health_state.clone();

        tokio::spawn(async move {
            if let Err(e) = metrics_server
                .start(health_path, metrics_path, health_state_clone)
                .await
            {
                error!(error = %e, "Metrics server failed");
            }
        });

        info!(port = config.metrics.port, "Metrics server started");
    }

    let shutdown = CancellationToken::new();

    let source = build_source(
        config.beacon.backend_kind()?,
        &config.beacon.address,
        config.beacon.request_timeout(),
    )?;
    let server = Arc::new(GrpcStatsServer::new(&config.server)?);
    let token = Arc::new(SessionToken::load(TokenStore::new(config.token_path()))?);

    let mut manager = SessionManager::new(
        SessionSettings::new(config.server.node_name.clone()),
        source,
        server,
        token,
    )
    .with_health_state(health_state);

    if let Some(metrics_addr) = &config.beacon.metrics_address {
        let watcher = Arc::new(MemoryWatcher::new(metrics_addr)?);
        let watcher_task = watcher.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(async move { watcher_task.run(cancel).await });
        info!(url = %metrics_addr, "Memory usage watcher started");
        manager = manager.with_memory_source(watcher);
    }

    tokio::spawn(shutdown_signal(shutdown.clone()));

    info!("Press Ctrl+C to shut down");
    let result = manager.run(shutdown.clone()).await;
    shutdown.cancel();

    if let Err(e) = result {
        error!(error = %e, "Client stopped");
        return Err(e.into());
    }

    info!("work done. goodbye!");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal");
    shutdown.cancel();
}
