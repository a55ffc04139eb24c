//! Application configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or none at all)
//! yields a working production setup.

use std::{path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    consts::{
        DEFAULT_LOADING_TIMEOUT_SECS, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RAW_LOG_CAPACITY,
        DEFAULT_RECONNECT_STEP_MS, SOCKET_PATH,
    },
    errors::ParseError,
    helpers::BaseUrl,
    logging::LogConfig,
    prelude::*,
    quotes::{DedupPolicy, PipelineConfig},
    ws::{ConnectionConfig, TransportKind},
    Error,
};

/// Environment variable consulted when no auth token is configured.
pub const AUTH_TOKEN_ENV: &str = "QUOTE_SERVICE_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// `production`, `staging`, `localhost` or a full URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// Prefer the `QUOTE_SERVICE_TOKEN` environment variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Tried in order
    #[serde(default = "default_transports")]
    pub transports: Vec<TransportKind>,
}

fn default_base_url() -> String {
    "production".to_string()
}

fn default_socket_path() -> String {
    SOCKET_PATH.to_string()
}

fn default_transports() -> Vec<TransportKind> {
    vec![TransportKind::WebSocket, TransportKind::Polling]
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            socket_path: default_socket_path(),
            auth_token: None,
            transports: default_transports(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionSettings {
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Attempt `n` waits `n * reconnect_step_ms`
    #[serde(default = "default_reconnect_step_ms")]
    pub reconnect_step_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_emit_queue_limit")]
    pub emit_queue_limit: usize,
}

fn default_max_reconnect_attempts() -> u32 {
    DEFAULT_MAX_RECONNECT_ATTEMPTS
}

fn default_reconnect_step_ms() -> u64 {
    DEFAULT_RECONNECT_STEP_MS
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_emit_queue_limit() -> usize {
    64
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_step_ms: default_reconnect_step_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            emit_queue_limit: default_emit_queue_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineSettings {
    #[serde(default = "default_loading_timeout_secs")]
    pub loading_timeout_secs: u64,
    /// `0` disables the raw event log
    #[serde(default = "default_raw_log_capacity")]
    pub raw_log_capacity: usize,
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
}

fn default_loading_timeout_secs() -> u64 {
    DEFAULT_LOADING_TIMEOUT_SECS
}

fn default_raw_log_capacity() -> usize {
    DEFAULT_RAW_LOG_CAPACITY
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            loading_timeout_secs: default_loading_timeout_secs(),
            raw_log_capacity: default_raw_log_capacity(),
            dedup_policy: DedupPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// JSON document holding the wizard state
    #[serde(default = "default_trip_file")]
    pub trip_file: PathBuf,
}

fn default_trip_file() -> PathBuf {
    PathBuf::from("travel_insurance.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            trip_file: default_trip_file(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(|e| Error::Parse(ParseError::Toml(e.to_string())))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Parse(ParseError::Toml(e.to_string())))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        if self.network.transports.is_empty() {
            return Err(Error::Config("network.transports must not be empty".to_string()));
        }
        if !self.network.socket_path.starts_with('/') {
            return Err(Error::Config(format!(
                "network.socket_path must start with '/', got '{}'",
                self.network.socket_path
            )));
        }
        if self.connection.reconnect_step_ms == 0 {
            return Err(Error::Config("connection.reconnect_step_ms must be positive".to_string()));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(Error::Config("connection.connect_timeout_ms must be positive".to_string()));
        }
        if self.pipeline.loading_timeout_secs == 0 {
            return Err(Error::Config("pipeline.loading_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn base_url(&self) -> Result<BaseUrl> {
        BaseUrl::parse(&self.network.base_url).ok_or_else(|| {
            Error::Config(format!(
                "network.base_url '{}' is neither a network name nor a URL",
                self.network.base_url
            ))
        })
    }

    /// Configured token, else the `QUOTE_SERVICE_TOKEN` environment variable.
    pub fn auth_token(&self) -> Option<String> {
        self.network
            .auth_token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| std::env::var(AUTH_TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }

    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        Ok(ConnectionConfig {
            base_url: self.base_url()?.get_url(),
            socket_path: self.network.socket_path.clone(),
            auth_token: self.auth_token(),
            transports: self.network.transports.clone(),
            max_reconnect_attempts: self.connection.max_reconnect_attempts,
            reconnect_step: Duration::from_millis(self.connection.reconnect_step_ms),
            connect_timeout: Duration::from_millis(self.connection.connect_timeout_ms),
            emit_queue_limit: self.connection.emit_queue_limit,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            loading_timeout: Duration::from_secs(self.pipeline.loading_timeout_secs),
            raw_log_capacity: self.pipeline.raw_log_capacity,
            dedup_policy: self.pipeline.dedup_policy,
        }
    }
}
