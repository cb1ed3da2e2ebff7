//! deltasync-client: run one push or pull against a server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deltasync::config::ClientConfig;
use deltasync::SessionManager;
use std::path::PathBuf;

/// Delta sync client
#[derive(Parser, Debug)]
#[command(name = "deltasync-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address, host:port
    server: String,

    /// Block length in bytes (must match the server)
    #[arg(long, global = true)]
    block_size: Option<usize>,

    /// Bytes scanned per parallel delta task
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Worker threads for hashing and file I/O
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// JSON configuration file; flags override its values
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Overwrite the server's file with a local one
    Push {
        /// Local source file
        local: PathBuf,
        /// Path of the file on the server
        remote: String,
    },

    /// Overwrite a local file with the server's
    Pull {
        /// Local destination file
        local: PathBuf,
        /// Path of the file on the server
        remote: String,
    },
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => ClientConfig::default(),
        };

        if let Some(n) = self.block_size {
            config.sync.block_size = n;
        }
        if let Some(n) = self.chunk_size {
            config.sync.chunk_size = n;
        }
        if let Some(n) = self.workers {
            config.sync.worker_threads = n;
        }

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
    let manager =
        SessionManager::new(cli.client_config()?).context("invalid client configuration")?;

    let endpoint = tokio::net::lookup_host(&cli.server)
        .await
        .with_context(|| format!("failed to resolve {}", cli.server))?
        .next()
        .with_context(|| format!("no address for {}", cli.server))?;

    let id = manager.connect(endpoint).await?;
    let handle = match cli.command {
        Commands::Push { local, remote } => manager.push(id, local, remote)?,
        Commands::Pull { local, remote } => manager.pull(id, local, remote)?,
    };

    let report = handle.await.context("transfer task failed")??;
    println!("{report}");

    Ok(())
}
