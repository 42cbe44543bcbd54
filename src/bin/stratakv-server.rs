//! STRATAKV Server Binary
//!
//! Sharded persistent key-value server core with background TTL expiration.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use stratakv::{Config, ServerEntry};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// STRATAKV Server - Sharded Key-Value Store Core
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of shard stores
    #[arg(long, default_value_t = 10)]
    shards: u32,

    /// Max TTL index entries enqueued per scanner pass
    #[arg(long, default_value_t = 1000)]
    scan_batch: usize,

    /// Scanner worker threads (0 = auto-detect based on CPU cores)
    #[arg(long, default_value_t = 4)]
    scan_workers: usize,

    /// Max deletions per deleter pass
    #[arg(long, default_value_t = 1000)]
    del_batch: usize,

    /// Deleter worker threads (0 = auto-detect based on CPU cores)
    #[arg(long, default_value_t = 4)]
    del_workers: usize,

    /// Seconds between expiration dispatch ticks
    #[arg(long, default_value_t = 10)]
    pause: u64,

    /// Enable cluster mode (defers expiration scans during migrations)
    #[arg(long, default_value_t = false)]
    cluster: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stratakv=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = Config::default()
        .with_shard_count(args.shards)
        .with_scan_batch(args.scan_batch)
        .with_del_batch(args.del_batch)
        .with_pause(Duration::from_secs(args.pause))
        .with_cluster_enabled(args.cluster);
    config.scan_pool_size = args.scan_workers;
    config.del_pool_size = args.del_workers;

    info!(
        "Starting STRATAKV server core with {} shards, expiration tick every {}s",
        args.shards, args.pause
    );

    let server = Arc::new(ServerEntry::startup(config)?);

    let waiter = {
        let server = server.clone();
        std::thread::spawn(move || server.wait_stop_complete())
    };

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    server.handle_shutdown_cmd();

    if waiter.join().is_err() {
        anyhow::bail!("shutdown waiter panicked");
    }
    Ok(())
}
