//! Gateway configuration.
//!
//! Configuration is read from a YAML file whose path is given by the
//! `--config` flag or the `CONFIG_PATH` environment variable. `env` and
//! `storage_path` are required; everything else has a default.
//!
//! ```yaml
//! env: dev
//! storage_path: ./storage
//! http_server:
//!   address: 127.0.0.1:8080
//! upstream:
//!   base_url: http://127.0.0.1:11434/api
//!   request_timeout_secs: 120
//! generation:
//!   temperature: 0.7
//!   max_tokens: 1024
//!   top_p: 0.9
//!   stop: ["\n"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config path is not set (use --config or CONFIG_PATH)")]
    MissingPath,

    #[error("Config file is not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error occurred while parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "llm-gateway", version, about)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(long = "config", env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub env: String,
    pub storage_path: String,
    #[serde(default)]
    pub http_server: HttpServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub generation: GenerationDefaults,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub cors_permissive: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    pub address: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    /// Deadline for response headers and buffered bodies; also the idle
    /// limit between chunks of a stream.
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434/api".to_string(),
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

/// Generation parameters attached to every upstream chat call.
/// Callers of the HTTP API cannot override these.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerationDefaults {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stop: Vec<String>,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.9,
            stop: vec!["\n".to_string()],
        }
    }
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Config {
    /// Resolve the config path from the CLI, then load it.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let path = cli.config.as_deref().ok_or(ConfigError::MissingPath)?;
        Self::load(path, std::env::var("ENV").ok())
    }

    /// Load and validate the config file at `path`. A non-empty
    /// `env_override` replaces the file's `env` value.
    pub fn load(path: &Path, env_override: Option<String>) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_yaml_str(&raw)?;
        if let Some(env) = env_override.filter(|e| !e.is_empty()) {
            config.env = env;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.env.trim().is_empty() {
            return Err(ConfigError::Invalid("env must not be empty".into()));
        }
        if self.storage_path.trim().is_empty() {
            return Err(ConfigError::Invalid("storage_path must not be empty".into()));
        }
        if self.http_server.address.trim().is_empty() {
            return Err(ConfigError::Invalid("http_server.address must not be empty".into()));
        }
        if self.upstream.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream.request_timeout_secs must be greater than 0".into(),
            ));
        }

        let url = reqwest::Url::parse(&self.upstream.base_url).map_err(|e| {
            ConfigError::Invalid(format!(
                "upstream.base_url '{}' is not a valid URL: {}",
                self.upstream.base_url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "upstream.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.connect_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
