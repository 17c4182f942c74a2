//! `fwdcached` — the fwdcache peer daemon.
//!
//! Runs one peer of a forward-caching pool: the boundary proxy serving the
//! resources this peer owns, backed by an LRU-bounded response cache.
//!
//! # Usage
//!
//! ```text
//! fwdcached start                                    # start a peer
//! fwdcached start -c fwdcache.toml                   # start with a config file
//! fwdcached start --self-url http://10.0.0.2:4830 \
//!     --peer http://10.0.0.1:4830 -l 0.0.0.0:4830   # join a pool
//! fwdcached owner https://example.com/app.js         # who caches this URL
//! fwdcached fetch https://example.com/app.js         # fetch through the pool
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use fwdcache_net::{BufferPool, HttpTransport, Transport, X_FROM_CACHE};
use fwdcache_peer::{Peer, Router};
use fwdcache_store::{ByteCache, FileStore, LruStore, MemoryStore};
use http::Request;
use tracing::{info, warn};

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "fwdcached", version, about = "fwdcache forward-caching peer daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a peer.
    Start {
        /// Base URL other peers reach this one at (e.g. "http://10.0.0.2:4830").
        #[arg(long, env = "FWDCACHE_SELF_URL")]
        self_url: Option<String>,

        /// Override listen address (e.g. "127.0.0.1:4831").
        #[arg(short = 'l', long)]
        listen_addr: Option<String>,

        /// Pool member base URL. Can be specified multiple times.
        #[arg(short, long)]
        peer: Vec<String>,

        /// Keep cached responses in memory only.
        #[arg(short, long)]
        memory: bool,
    },

    /// Print the peer owning a resource in the configured pool.
    Owner {
        /// Absolute URL of the resource.
        url: String,
    },

    /// Fetch a resource through the configured pool.
    Fetch {
        /// Absolute URL of the resource.
        url: String,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    setup_tracing(&config.log.level);

    match cli.command {
        Commands::Start {
            self_url,
            listen_addr,
            peer,
            memory,
        } => {
            // CLI args override config file values.
            if let Some(url) = self_url {
                config.peer.self_url = url;
            }
            if let Some(addr) = listen_addr {
                config.peer.listen_addr = addr;
            }
            if !peer.is_empty() {
                config.pool.peers = peer;
            }
            if memory {
                config.cache.backend = "memory".to_string();
            }
            cmd_start(config).await
        }
        Commands::Owner { url } => cmd_owner(&config, &url),
        Commands::Fetch { url } => cmd_fetch(&config, &url).await,
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` env var if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// -----------------------------------------------------------------------
// fwdcached start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig) -> Result<()> {
    info!("starting fwdcached");

    let store = open_store(&config)?;
    let max_bytes = config.cache_max_bytes();
    let cache: Arc<dyn ByteCache> = Arc::new(LruStore::new(store, max_bytes));

    let mut builder = Peer::builder(config.peer.self_url.clone())
        .router_config(config.router_config())
        .cache(cache)
        .pool(config.pool_peers());
    if config.buffers.enabled {
        builder = builder.buffer_pool(BufferPool::new(config.buffers.size));
    }
    let peer = builder.build().context("failed to build peer")?;

    info!(
        self_url = %config.peer.self_url,
        peers = peer.peers().len(),
        backend = %config.cache.backend,
        max_bytes,
        "peer ready"
    );

    peer.serve_with_shutdown(&config.peer.listen_addr, shutdown_signal())
        .await
        .context("boundary proxy failed")?;

    info!("fwdcached stopped");
    Ok(())
}

/// Open the backing store named by `[cache] backend`.
///
/// The LRU index starts empty, so a file backend drops the entries left by a
/// previous run, which could never be evicted. Other files in the directory
/// are kept.
fn open_store(config: &CliConfig) -> Result<Arc<dyn ByteCache>> {
    match config.cache.backend.as_str() {
        "memory" => {
            info!("using in-memory cache");
            Ok(Arc::new(MemoryStore::new()))
        }
        "file" => {
            let dir = &config.cache.dir;
            let store = FileStore::new(dir)
                .with_context(|| format!("failed to open cache dir {}", dir.display()))?;
            let removed = store
                .clear()
                .with_context(|| format!("failed to clear cache dir {}", dir.display()))?;
            info!(dir = %dir.display(), removed, "using file cache");
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown cache backend: {other} (expected \"memory\" or \"file\")"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

// -----------------------------------------------------------------------
// fwdcached owner
// -----------------------------------------------------------------------

fn cmd_owner(config: &CliConfig, url: &str) -> Result<()> {
    let router = client_router(config)?;
    match router.owner(url) {
        Some(owner) => println!("{owner}"),
        None => anyhow::bail!("the pool is empty"),
    }
    Ok(())
}

// -----------------------------------------------------------------------
// fwdcached fetch
// -----------------------------------------------------------------------

async fn cmd_fetch(config: &CliConfig, url: &str) -> Result<()> {
    let router = client_router(config)?;
    let req = Request::get(url)
        .body(Bytes::new())
        .with_context(|| format!("invalid url {url}"))?;

    let resp = router.round_trip(&req).await.context("request failed")?;
    let from_cache = resp
        .headers()
        .get(X_FROM_CACHE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    println!("owner:      {}", router.owner(url).unwrap_or_default());
    println!("status:     {}", resp.status());
    println!("from cache: {from_cache}");
    println!("body:       {} bytes", resp.body().len());
    Ok(())
}

/// A router that sends requests into the pool without being part of it.
fn client_router(config: &CliConfig) -> Result<Router> {
    let transport = HttpTransport::new().context("failed to create http client")?;
    let router = Router::new(config.router_config(), Arc::new(transport));
    router.set_pool(config.pool_peers());
    Ok(router)
}
