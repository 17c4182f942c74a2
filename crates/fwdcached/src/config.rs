//! TOML configuration for the fwdcache daemon.
//!
//! When no config file is provided, [`CliConfig::auto_detect`] probes the
//! system (RAM via `/proc/meminfo`) and sizes the cache budget from it.

use std::path::{Path, PathBuf};

use fwdcache_peer::{DEFAULT_PATH, RouterConfig};
use fwdcache_ring::DEFAULT_REPLICAS;
use serde::Deserialize;

/// Cache budget used when neither the config nor RAM detection gives one.
const DEFAULT_CACHE_BYTES: u64 = 256 * 1024 * 1024;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Identity and listen address of this peer.
    pub peer: PeerSection,
    /// Pool membership.
    pub pool: PoolSection,
    /// Response cache backend.
    pub cache: CacheSection,
    /// Body buffer pooling.
    pub buffers: BuffersSection,
    /// Logging configuration.
    pub log: LogSection,
}

/// `[peer]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PeerSection {
    /// Base URL other peers reach this one at. Also its ring identity.
    pub self_url: String,
    /// Address the boundary proxy binds to.
    pub listen_addr: String,
    /// Path of the boundary proxy.
    pub path: String,
}

impl Default for PeerSection {
    fn default() -> Self {
        Self {
            self_url: "http://127.0.0.1:4830".to_string(),
            listen_addr: "0.0.0.0:4830".to_string(),
            path: DEFAULT_PATH.to_string(),
        }
    }
}

/// `[pool]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Base URLs of the pool members. This peer is added if missing.
    pub peers: Vec<String>,
    /// Ring positions per peer. Every member must use the same value.
    pub replicas: Option<usize>,
}

/// `[cache]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Backend type: `"memory"` (default) or `"file"`.
    pub backend: String,
    /// Directory of the file backend.
    pub dir: PathBuf,
    /// Byte budget of the LRU layer. Auto-detected if omitted.
    pub max_bytes: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        let dir = dirs::home_dir()
            .map(|h| h.join(".fwdcache").join("cache"))
            .unwrap_or_else(|| PathBuf::from(".fwdcache/cache"));
        Self {
            backend: "memory".to_string(),
            dir,
            max_bytes: None,
        }
    }
}

/// `[buffers]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BuffersSection {
    /// Drain bodies through pooled buffers.
    pub enabled: bool,
    /// Capacity of each pooled buffer in bytes.
    pub size: usize,
}

impl Default for BuffersSection {
    fn default() -> Self {
        Self {
            enabled: false,
            size: fwdcache_net::DEFAULT_BUFFER_SIZE,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Log level filter (e.g. `"info"`, `"debug"`, `"warn"`).
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file, or auto-detect if no path given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)?;
                let config: CliConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::auto_detect()),
        }
    }

    /// Parse config from a TOML string (used in tests).
    #[cfg(test)]
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Build a config with a RAM-adaptive cache budget.
    ///
    /// - < 1 GB RAM → 32 MB
    /// - 1–16 GB    → 256 MB
    /// - > 16 GB    → 2 GB
    pub fn auto_detect() -> Self {
        let mut config = Self::default();

        if let Some(ram) = detect_total_ram() {
            if ram < 1_073_741_824 {
                config.cache.max_bytes = Some(32 * 1024 * 1024);
            } else if ram > 17_179_869_184 {
                config.cache.max_bytes = Some(2 * 1024 * 1024 * 1024);
            }
        }

        config
    }

    /// Effective ring replica count.
    pub fn replicas(&self) -> usize {
        self.pool.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    /// Effective LRU byte budget. Defaults to 256 MB.
    pub fn cache_max_bytes(&self) -> u64 {
        self.cache.max_bytes.unwrap_or(DEFAULT_CACHE_BYTES)
    }

    /// Routing configuration shared by every member of the pool.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            path: self.peer.path.clone(),
            replicas: self.replicas(),
            ..RouterConfig::default()
        }
    }

    /// Pool members, always including this peer.
    pub fn pool_peers(&self) -> Vec<String> {
        let mut peers = self.pool.peers.clone();
        if !peers.contains(&self.peer.self_url) {
            peers.push(self.peer.self_url.clone());
        }
        peers
    }
}

/// Detect total system RAM in bytes by reading `/proc/meminfo`.
///
/// Returns `None` on non-Linux platforms or if the file cannot be read.
fn detect_total_ram() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb_str = rest.split_whitespace().next()?;
            let kb: u64 = kb_str.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}
