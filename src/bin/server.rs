//! Deeds Server
//!
//! Runs one of the three roles: control node, storage daemon or backup.

use anyhow::Context;
use clap::{Parser, Subcommand};
use deeds::config::{Environment, MasterConfig};
use deeds::control::ControlNode;
use deeds::core::backup_store::BackupStore;
use deeds::core::block_store::BlockStore;
use deeds::rpc::backup::BackupService;
use deeds::rpc::minion::{MinionService, TcpTransport};
use deeds::rpc::serve;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "deeds-server")]
#[command(about = "Distributed block file store services")]
struct Args {
    /// Bind address
    #[arg(short = 'a', long, default_value = "[::]:50051", global = true)]
    address: String,

    /// Concurrent requests handled per service
    #[arg(short = 'w', long, default_value_t = 10, global = true)]
    workers: usize,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Namespace and block allocation service
    Control {
        /// Path to the TOML configuration
        #[arg(short = 'c', long, default_value = "deeds.toml")]
        config: PathBuf,
    },
    /// Block storage daemon
    Storage {
        /// Block directory [default: $GFS_DATA_DIR or ~/gfs_root]
        #[arg(short = 'd', long)]
        data_dir: Option<PathBuf>,

        /// Timeout for forwarding to the next daemon, in milliseconds
        #[arg(long, default_value_t = 30_000)]
        forward_timeout_ms: u64,
    },
    /// Snapshot backup service
    Backup {
        /// Backup file [default: $DEEDS_BACKUP_LOCATION or ~/deeds.backup]
        #[arg(short = 'l', long)]
        location: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = Environment::from_env();
    let level = if env.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let args = Args::parse();
    let listener = TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("cannot bind {}", args.address))?;

    match args.role {
        Role::Control { config } => {
            let config = MasterConfig::load(&config)?;
            let workers = config.workers;
            info!(backup = %env.backup_addr, "Starting control node");

            let node = ControlNode::start(config, &env.backup_addr).await?;
            serve(listener, node.service(), workers, ctrl_c()).await?;

            if !node.shutdown().await {
                warn!("Namespace was not saved");
            }
        }
        Role::Storage {
            data_dir,
            forward_timeout_ms,
        } => {
            let data_dir = data_dir.unwrap_or(env.data_dir);
            info!(dir = %data_dir.display(), "Starting storage daemon");

            let transport = Arc::new(TcpTransport::new(Duration::from_millis(forward_timeout_ms)));
            let store = BlockStore::open(data_dir, env.wipe_passes, transport).await?;
            serve(listener, Arc::new(MinionService::new(store)), args.workers, ctrl_c()).await?;
        }
        Role::Backup { location } => {
            let location = location.unwrap_or(env.backup_location);
            info!(location = %location.display(), "Starting backup service");

            let store = Arc::new(
                BackupStore::open(&location)
                    .with_context(|| format!("cannot open backup {}", location.display()))?,
            );
            serve(
                listener,
                Arc::new(BackupService::new(Arc::clone(&store))),
                args.workers,
                ctrl_c(),
            )
            .await?;

            store.flush()?;
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}
