use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MirrorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Static peer base URLs for the built-in router.
    #[serde(default)]
    pub peers: Vec<String>,
    /// Upstream registries the runtime should route through this mirror.
    #[serde(default)]
    pub registries: Vec<String>,
    /// Mirror URLs written into the runtime's hosts.toml files. Usually
    /// just this node's own address.
    #[serde(default)]
    pub mirrors: Vec<String>,
    /// Runtime registry config directory; nothing is written when unset.
    #[serde(default)]
    pub registry_config_path: Option<String>,
    /// Advertise the `resolve` capability so the runtime resolves tags
    /// through the mirror.
    #[serde(default = "default_true")]
    pub resolve_tags: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Upper bound on candidate peers tried per request.
    #[serde(default = "default_resolve_retries")]
    pub resolve_retries: usize,
    /// Wall-clock budget for resolving and attempting candidates. Does not
    /// cover the winning response body transfer.
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    /// Serving the mutable `latest` tag from peers risks staleness races;
    /// disable to refuse it outright.
    #[serde(default = "default_true")]
    pub resolve_latest_tag: bool,
    /// Address peers use to reach this node. Requests whose Host header
    /// differs are treated as external.
    #[serde(default = "default_local_addr")]
    pub local_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_resolve_retries() -> usize {
    3
}

fn default_resolve_timeout_ms() -> u64 {
    5000
}

fn default_local_addr() -> String {
    "127.0.0.1:5000".to_string()
}

fn default_content_dir() -> String {
    "cache/mirror".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            mirror: MirrorConfig::default(),
            storage: StorageConfig::default(),
            peers: Vec::new(),
            registries: Vec::new(),
            mirrors: Vec::new(),
            registry_config_path: None,
            resolve_tags: default_true(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            resolve_retries: default_resolve_retries(),
            resolve_timeout_ms: default_resolve_timeout_ms(),
            resolve_latest_tag: default_true(),
            local_addr: default_local_addr(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
        }
    }
}

impl MirrorConfig {
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| {
            MirrorError::Config(format!("failed to parse {}: {}", path.display(), err))
        })
    }
}
