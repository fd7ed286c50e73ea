//! Configuration management for the beaconstats client
//!
//! Supports loading from TOML files, CLI overrides and environment variables.

use beaconstats_adapters::http::parse_base_url;
use beaconstats_adapters::memory::parse_metrics_url;
use beaconstats_adapters::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of the session token file inside the data folder
pub const TOKEN_FILE_NAME: &str = "token.dat";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Stats server connection
    #[serde(default)]
    pub server: ServerSettings,

    /// Monitored beacon node
    #[serde(default)]
    pub beacon: BeaconSettings,

    /// Local persistent state
    #[serde(default)]
    pub data: DataSettings,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// CLI values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_addr: Option<String>,
    pub node_name: Option<String>,
    pub beacon_kind: Option<String>,
    pub beacon_addr: Option<String>,
    pub beacon_metrics_addr: Option<String>,
    pub data_folder: Option<PathBuf>,
    pub insecure: bool,
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(addr) = overrides.server_addr {
            self.server.address = addr;
        }
        if let Some(name) = overrides.node_name {
            self.server.node_name = name;
        }
        if let Some(kind) = overrides.beacon_kind {
            self.beacon.kind = kind;
        }
        if let Some(addr) = overrides.beacon_addr {
            self.beacon.address = addr;
        }
        if let Some(addr) = overrides.beacon_metrics_addr {
            self.beacon.metrics_address = Some(addr);
        }
        if let Some(folder) = overrides.data_folder {
            self.data.folder = folder;
        }
        if overrides.insecure {
            self.server.tls = false;
        }
        self
    }

    /// Apply environment variable overrides to all settings
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var("BEACONSTATS_SERVER_ADDR") {
            self.server.address = addr;
        }
        if let Ok(name) = std::env::var("BEACONSTATS_NODE_NAME") {
            self.server.node_name = name;
        }
        if let Ok(kind) = std::env::var("BEACONSTATS_BEACON_KIND") {
            self.beacon.kind = kind;
        }
        if let Ok(addr) = std::env::var("BEACONSTATS_BEACON_ADDR") {
            self.beacon.address = addr;
        }
        if let Ok(addr) = std::env::var("BEACONSTATS_METRICS_ADDR") {
            self.beacon.metrics_address = Some(addr);
        }
        if let Ok(folder) = std::env::var("BEACONSTATS_DATA_FOLDER") {
            self.data.folder = PathBuf::from(folder);
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.node_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "node name cannot be empty".to_string(),
            ));
        }

        if self.server.address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "stats server address cannot be empty".to_string(),
            ));
        }
        self.server
            .endpoint_uri()
            .parse::<tonic::transport::Uri>()
            .map_err(|e| {
                ConfigError::ValidationError(format!(
                    "invalid stats server address {}: {}",
                    self.server.address, e
                ))
            })?;

        self.beacon.backend_kind()?;
        parse_base_url(&self.beacon.address)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if let Some(addr) = &self.beacon.metrics_address {
            parse_metrics_url(addr).map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        if self.beacon.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "request timeout cannot be 0".to_string(),
            ));
        }

        // Validate data folder is writable
        if !self.data.folder.exists() {
            std::fs::create_dir_all(&self.data.folder).map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Cannot create data folder {:?}: {}",
                    self.data.folder, e
                ))
            })?;
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::ValidationError(
                "metrics port cannot be 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Path of the persisted session token
    pub fn token_path(&self) -> PathBuf {
        self.data.folder.join(TOKEN_FILE_NAME)
    }
}

/// Stats server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Stats server gRPC address (`host:port` or a full URI)
    #[serde(default = "default_server_addr")]
    pub address: String,

    /// Use TLS towards the stats server
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Name this node is listed under
    #[serde(default = "default_node_name")]
    pub node_name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_server_addr(),
            tls: true,
            node_name: default_node_name(),
        }
    }
}

impl ServerSettings {
    /// gRPC endpoint URI, adding the scheme implied by `tls` when missing
    pub fn endpoint_uri(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else if self.tls {
            format!("https://{}", self.address)
        } else {
            format!("http://{}", self.address)
        }
    }
}

fn default_server_addr() -> String {
    "eth2stats.io:443".to_string()
}

fn default_node_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "beaconstats-client".to_string())
}

fn default_true() -> bool {
    true
}

/// Beacon node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconSettings {
    /// Node API flavour (`v1`, `lighthouse`, `teku`, `lodestar` or `nimbus`)
    #[serde(default = "default_beacon_kind")]
    pub kind: String,

    /// Node REST API base URL
    #[serde(default = "default_beacon_addr")]
    pub address: String,

    /// Node Prometheus endpoint, used for memory usage
    #[serde(default)]
    pub metrics_address: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for BeaconSettings {
    fn default() -> Self {
        Self {
            kind: default_beacon_kind(),
            address: default_beacon_addr(),
            metrics_address: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl BeaconSettings {
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        self.kind
            .parse()
            .map_err(|e: beaconstats_core::BeaconStatsError| {
                ConfigError::ValidationError(e.to_string())
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_beacon_kind() -> String {
    BackendKind::V1.to_string()
}

fn default_beacon_addr() -> String {
    "http://localhost:5052".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

/// Local persistent state configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Folder holding the session token
    #[serde(default = "default_data_folder")]
    pub folder: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            folder: default_data_folder(),
        }
    }
}

fn default_data_folder() -> PathBuf {
    PathBuf::from("./data")
}

/// Metrics and monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Enable Prometheus metrics endpoint
    #[serde(default)]
    pub enabled: bool,

    /// Metrics HTTP server port
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// Health check endpoint path
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            health_path: default_health_path(),
            metrics_path: default_metrics_path(),
        }
    }
}

fn default_metrics_port() -> u16 {
    9464
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}
