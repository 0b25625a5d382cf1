use crate::crawl::CrawlConfig;
use crate::network::ProberConfig;
use crate::node::NodeIdentity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete configuration for a scan run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Where a fresh crawl starts
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Budget and timeouts
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// Checkpoint location
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_bootstrap_host")]
    pub host: String,

    #[serde(default = "default_bootstrap_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// Maximum probe attempts per run
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Outer deadline per probe task (milliseconds)
    #[serde(default = "default_probe_deadline_ms")]
    pub probe_deadline_ms: u64,

    /// Connect and read timeout inside a probe (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Largest Levin frame body accepted (bytes)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding p2p_scan.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

// Default value functions
fn default_bootstrap_host() -> String {
    "176.9.0.187".to_string()
}

fn default_bootstrap_port() -> u16 {
    18080
}

fn default_limit() -> usize {
    100
}

fn default_probe_deadline_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_body_size() -> u64 {
    4 * 1024 * 1024
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            host: default_bootstrap_host(),
            port: default_bootstrap_port(),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            probe_deadline_ms: default_probe_deadline_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_body_size: default_max_body_size(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: ScanConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap.host.is_empty() {
            return Err(ConfigError::ValidationError("bootstrap host cannot be empty".to_string()));
        }

        if self.bootstrap.port == 0 {
            return Err(ConfigError::ValidationError("bootstrap port must be > 0".to_string()));
        }

        if self.crawl.limit == 0 {
            return Err(ConfigError::ValidationError("limit must be > 0".to_string()));
        }

        if self.crawl.probe_deadline_ms == 0 || self.crawl.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError("timeouts must be > 0".to_string()));
        }

        if self.crawl.max_body_size == 0 {
            return Err(ConfigError::ValidationError("max_body_size must be > 0".to_string()));
        }

        Ok(())
    }

    /// The node a fresh crawl starts from
    pub fn bootstrap_node(&self) -> NodeIdentity {
        NodeIdentity::new(self.bootstrap.host.clone(), self.bootstrap.port)
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            limit: self.crawl.limit,
            probe_deadline: Duration::from_millis(self.crawl.probe_deadline_ms),
        }
    }

    pub fn prober_config(&self) -> ProberConfig {
        ProberConfig {
            io_timeout: Duration::from_millis(self.crawl.connect_timeout_ms),
            max_body_size: self.crawl.max_body_size,
        }
    }
}
