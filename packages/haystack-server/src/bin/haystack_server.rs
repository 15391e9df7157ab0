//! Command-line entrypoint (§6 "Server command surface").
//!
//! Wires a [`Store`] (in-memory or mmap-backed, per `--storage`) to a
//! [`UdpDispatcher`], installs a `tracing` subscriber, and runs until
//! `Ctrl-C` or a termination signal, honoring the 5 s shutdown grace
//! period. `--stats` is a supplementary one-shot mode: print the
//! persistent store's record tallies and exit without serving traffic.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use haystack_core::{Clock, Logger, SystemClock};
use haystack_server::network::{DispatcherConfig, UdpDispatcher};
use haystack_server::storage::{MemoryStore, PersistentStore, StorageKind, Store, StoreConfig};
use haystack_server::logging::{init_tracing, TracingLogger};

#[derive(Parser, Debug)]
#[command(name = "haystack-server", about = "A tiny, ephemeral, content-addressed key/value store over UDP")]
struct Cli {
    /// Bind address, `host:port`.
    #[arg(long, env = "HAYSTACK_ADDR", default_value = "0.0.0.0:11311")]
    addr: String,

    /// Storage backend.
    #[arg(long, value_enum, env = "HAYSTACK_STORAGE", default_value = "memory")]
    storage: StorageChoice,

    /// Directory for the data and index files (only used by `--storage mmap`).
    #[arg(long, env = "HAYSTACK_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Maximum number of live entries the store will hold.
    #[arg(long, default_value_t = 2_000_000)]
    max_items: u64,

    /// Log verbosity.
    #[arg(long, env = "HAYSTACK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Alias for `--log-level silent`.
    #[arg(long)]
    quiet: bool,

    /// Print store stats (mmap storage only) and exit without serving.
    #[arg(long)]
    stats: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StorageChoice {
    Memory,
    Mmap,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("haystack-server: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let log_level = if cli.quiet { "silent" } else { cli.log_level.as_str() };
    init_tracing(log_level)?;
    let logger: Arc<dyn Logger> = Arc::new(TracingLogger);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store_config = StoreConfig {
        kind: match cli.storage {
            StorageChoice::Memory => StorageKind::Memory,
            StorageChoice::Mmap => StorageKind::Mmap,
        },
        data_dir: cli.data_dir.clone(),
        max_items: cli.max_items,
        ..StoreConfig::default()
    };

    if cli.stats {
        return print_stats(&store_config, clock, logger);
    }

    let store: Arc<dyn Store> = match cli.storage {
        StorageChoice::Memory => Arc::new(MemoryStore::new(&store_config, clock, Arc::clone(&logger))),
        StorageChoice::Mmap => PersistentStore::open(&store_config, clock, Arc::clone(&logger))?,
    };

    let (host, port) = split_addr(&cli.addr)?;
    let dispatcher_config = DispatcherConfig {
        host: host.clone(),
        port,
        ..DispatcherConfig::default()
    };

    let mut dispatcher = UdpDispatcher::new(dispatcher_config, store, Arc::clone(&logger));
    let bound_port = dispatcher.start().await?;
    haystack_core::log_info!(logger, "haystack-server listening on {host}:{bound_port}");

    dispatcher
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

fn print_stats(config: &StoreConfig, clock: Arc<dyn Clock>, logger: Arc<dyn Logger>) -> anyhow::Result<()> {
    if config.kind != StorageKind::Mmap {
        anyhow::bail!("--stats requires --storage mmap");
    }
    let store = PersistentStore::open(config, clock, logger)?;
    let stats = store.stats();
    println!(
        "total={} active={} expired={} deleted={} bytes={}",
        stats.total, stats.active, stats.expired, stats.deleted, stats.bytes
    );
    Ok(())
}

fn split_addr(addr: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("invalid addr {addr:?}, expected host:port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid port in addr {addr:?}"))?;
    Ok((host.to_string(), port))
}
