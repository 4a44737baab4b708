#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shardkv_lmdb::{LmdbStorage, DEFAULT_MAP_SIZE};
use shardkv_node::{NodeConfig, NodeRole, ShardNode};
use shardkv_replication::{ReplicationConfig, DEFAULT_REQUEST_TIMEOUT};
use shardkv_shard::{ShardConfig, ShardMetadata};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args: Args = Args::parse();

    info!(
        db_location = %args.db_location.display(),
        http_addr = %args.http_addr,
        config_file = %args.config_file.display(),
        shard = %args.shard,
        replica = args.replica,
        db_map_size = args.db_map_size,
        "Starting shardkv node."
    );

    let shard_config = ShardConfig::from_file(&args.config_file)
        .with_context(|| format!("failed to load {}", args.config_file.display()))?;
    let metadata = ShardMetadata::build(&shard_config.shards, &args.shard)?;

    let storage = LmdbStorage::open_with_map_size(&args.db_location, args.db_map_size)
        .await
        .with_context(|| format!("failed to open {}", args.db_location.display()))?;

    let role = if args.replica {
        NodeRole::Replica
    } else {
        NodeRole::Leader
    };
    let replication = ReplicationConfig {
        interval: Duration::from_millis(args.replication_interval_ms),
        request_timeout: DEFAULT_REQUEST_TIMEOUT,
        max_entries_per_tick: args.replication_batch,
    };
    let config = NodeConfig::new(args.http_addr, metadata)
        .with_role(role)
        .with_replication(replication);

    let node = ShardNode::start(config, storage).await?;

    shutdown_signal().await;
    info!("Shutdown signal received.");

    node.shutdown().await?;

    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long)]
    /// The directory of the LMDB database.
    ///
    /// It is created if it does not exist.
    db_location: PathBuf,

    #[arg(long, default_value_t = DEFAULT_MAP_SIZE)]
    /// The maximum size of the LMDB database in bytes.
    ///
    /// The map is reserved as virtual memory, disk space is only used as
    /// data is written.
    db_map_size: usize,

    #[arg(long)]
    /// The address for the HTTP server to listen on.
    http_addr: SocketAddr,

    #[arg(long, default_value = "sharding.toml")]
    /// The TOML file listing every shard of the cluster.
    config_file: PathBuf,

    #[arg(long)]
    /// The name of the shard this node serves.
    shard: String,

    #[arg(long)]
    /// Runs the node as a read-only replica of the shard's leader.
    replica: bool,

    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    /// The time between two pulls from the leader, in milliseconds.
    replication_interval_ms: u64,

    #[arg(long, default_value_t = 1, value_parser = parse_batch_size)]
    /// The maximum number of pending writes pulled per tick.
    replication_batch: usize,
}

fn parse_batch_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("the batch size must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Unable to install the ctrl+c handler.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::SignalKind;

        tokio::select! {
            _ = unix_signal(SignalKind::terminate(), "SIGTERM") => {},
            _ = unix_signal(SignalKind::hangup(), "SIGHUP") => {},
            _ = unix_signal(SignalKind::quit(), "SIGQUIT") => {},
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, name: &str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut signal) => {
            signal.recv().await;
            debug!(signal = name, "Received signal.");
        },
        Err(e) => {
            error!(error = %e, signal = name, "Unable to install the signal handler.");
            std::future::pending::<()>().await;
        },
    }
}
