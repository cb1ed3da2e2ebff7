//! deltasync-server: serve push and pull requests until killed

use anyhow::{Context, Result};
use clap::Parser;
use deltasync::config::ServerConfig;
use deltasync::metrics::{start_metrics_server, MetricsConfig};
use deltasync::SyncServer;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Delta sync server
#[derive(Parser, Debug)]
#[command(name = "deltasync-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(long, short)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Serve only paths beneath this directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Maximum concurrent sessions
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Block length in bytes (must match the clients)
    #[arg(long)]
    block_size: Option<usize>,

    /// Bytes scanned per parallel delta task
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Worker threads for hashing and file I/O
    #[arg(long)]
    workers: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Expose Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

impl Cli {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => ServerConfig::default(),
        };

        if let Some(ip) = self.bind {
            config.bind_addr.set_ip(ip);
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(root) = &self.root {
            config.root = Some(root.clone());
        }
        if let Some(n) = self.max_sessions {
            config.max_sessions = n;
        }
        if let Some(n) = self.block_size {
            config.sync.block_size = n;
        }
        if let Some(n) = self.chunk_size {
            config.sync.chunk_size = n;
        }
        if let Some(n) = self.workers {
            config.sync.worker_threads = n;
        }

        config.validate().context("invalid server configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.server_config()?;

    if let Some(addr) = cli.metrics_addr {
        start_metrics_server(MetricsConfig::with_addr(addr))
            .context("failed to start metrics exporter")?;
    }

    let server = SyncServer::bind(config)
        .await
        .context("failed to start server")?;

    tokio::select! {
        result = server.serve() => result.context("server stopped")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}
