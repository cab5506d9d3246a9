//! Configuration management for geows.
//!
//! This module handles the layered configuration system with the following precedence:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables
//! 3. JSON config file
//! 4. Default values (lowest priority)

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GeowsError, Result};

/// Command-line arguments for geows
#[derive(Parser, Debug, Default)]
#[command(name = "geows")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Host address to bind to
    #[arg(short = 'H', long, env = "GEOWS_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "GEOWS_PORT")]
    pub port: Option<u16>,

    /// Maximum number of handlers running at the same time
    #[arg(short, long, env = "GEOWS_WORKERS")]
    pub workers: Option<usize>,

    /// HTTP server implementation to start
    #[arg(long, env = "GEOWS_SERVER")]
    pub server: Option<String>,

    /// Path to the geo-array metadata document
    #[arg(long, env = "GEOWS_ARRAYS")]
    pub arrays: Option<PathBuf>,

    /// Path to the timeline manifest
    #[arg(long, env = "GEOWS_TIMELINES")]
    pub timelines: Option<PathBuf>,

    /// Coordinator host of the array database
    #[arg(long, env = "GEOWS_COORDINATOR_HOST")]
    pub coordinator_host: Option<String>,

    /// Coordinator port of the array database
    #[arg(long, env = "GEOWS_COORDINATOR_PORT")]
    pub coordinator_port: Option<u16>,

    /// Path to JSON configuration file
    #[arg(short, long, env = "GEOWS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GEOWS_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Handler concurrency limit (None = number of CPU cores)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Registered builder id selecting the HTTP server implementation
    #[serde(default = "default_implementation")]
    pub implementation: String,

    /// Deadline for a single handler invocation
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Array database backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Coordinator host
    #[serde(default = "default_coordinator_host")]
    pub coordinator_host: String,

    /// Coordinator port
    #[serde(default = "default_coordinator_port")]
    pub coordinator_port: u16,

    /// Instance name recorded on every connection
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Read/write timeout for a single backend query, in milliseconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
}

/// Metadata sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Geo-array metadata document
    #[serde(default)]
    pub arrays_file: Option<PathBuf>,

    /// Timeline manifest
    #[serde(default)]
    pub timelines_file: Option<PathBuf>,
}

/// Complete configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Metadata configuration
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with proper precedence
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Build configuration from already parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = &args.config {
            config = Self::load_from_file(config_path)?;
        }

        config.apply_args(args);
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GeowsError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| GeowsError::FileOpen {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override with command-line arguments and environment values
    fn apply_args(&mut self, args: Args) {
        if let Some(host) = args.host {
            self.server.host = host;
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if args.workers.is_some() {
            self.server.workers = args.workers;
        }
        if let Some(server) = args.server {
            self.server.implementation = server;
        }
        if args.arrays.is_some() {
            self.metadata.arrays_file = args.arrays;
        }
        if args.timelines.is_some() {
            self.metadata.timelines_file = args.timelines;
        }
        if let Some(host) = args.coordinator_host {
            self.backend.coordinator_host = host;
        }
        if let Some(port) = args.coordinator_port {
            self.backend.coordinator_port = port;
        }
        if let Some(level) = args.log_level {
            self.log_level = level;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(GeowsError::Config {
                message: "Server host cannot be empty".to_string(),
            });
        }

        // 0 is not a valid port for users
        if self.server.port == 0 {
            return Err(GeowsError::Config {
                message: "Server port cannot be 0".to_string(),
            });
        }

        if self.server.workers == Some(0) {
            return Err(GeowsError::Config {
                message: "Worker count cannot be 0".to_string(),
            });
        }

        if self.server.request_timeout_secs == 0 {
            return Err(GeowsError::Config {
                message: "Request timeout cannot be 0".to_string(),
            });
        }

        if self.server.implementation.is_empty() {
            return Err(GeowsError::Config {
                message: "Server implementation cannot be empty".to_string(),
            });
        }

        if self.backend.coordinator_host.is_empty() {
            return Err(GeowsError::Config {
                message: "Coordinator host cannot be empty".to_string(),
            });
        }

        if self.backend.coordinator_port == 0 {
            return Err(GeowsError::Config {
                message: "Coordinator port cannot be 0".to_string(),
            });
        }

        if self.backend.connect_timeout_ms == 0 || self.backend.query_timeout_ms == 0 {
            return Err(GeowsError::Config {
                message: "Backend timeouts cannot be 0".to_string(),
            });
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(GeowsError::Config {
                    message: format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        self.log_level
                    ),
                });
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            metadata: MetadataConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Effective handler concurrency limit
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            implementation: default_implementation(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            coordinator_host: default_coordinator_host(),
            coordinator_port: default_coordinator_port(),
            instance_name: default_instance_name(),
            connect_timeout_ms: default_connect_timeout(),
            query_timeout_ms: default_query_timeout(),
        }
    }
}

// Default value functions for serde
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7654
}

fn default_implementation() -> String {
    "axum".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_coordinator_host() -> String {
    "localhost".to_string()
}

fn default_coordinator_port() -> u16 {
    1239
}

fn default_instance_name() -> String {
    "geows".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_query_timeout() -> u64 {
    30000
}

fn default_log_level() -> String {
    "info".to_string()
}
