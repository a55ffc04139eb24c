//! Structured logging setup.
//!
//! Library code logs through `tracing`; the websocket layer uses `log`, which
//! the subscriber bridges. Output goes to stdout and optionally to files:
//!
//! | Mode | Files |
//! |------|-------|
//! | `log_dir` set | `quote-watch.log` (all, JSON) and `quote-watch-errors.log` (WARN+), rotated daily |
//! | `log_file` set | one JSON file, not rotated |
//!
//! ```bash
//! # Trace the connection manager only
//! RUST_LOG=warn,travel_quote_sdk::ws=trace cargo run --bin quote_watch
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, Registry};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON format (best for log aggregation)
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            other => Err(format!("Unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LogConfig {
    /// Filter directive when `RUST_LOG` is unset (default: `info`)
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,

    #[serde(default)]
    pub stdout_format: LogFormat,

    /// Directory for daily-rotated log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Single log file; ignored when `log_dir` is set
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Level for the errors file (default: `warn`)
    #[serde(default = "default_error_level")]
    pub error_level: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_enable_stdout() -> bool {
    true
}

fn default_error_level() -> String {
    "warn".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            enable_stdout: default_enable_stdout(),
            stdout_format: LogFormat::default(),
            log_dir: None,
            log_file: None,
            error_level: default_error_level(),
        }
    }
}

impl LogConfig {
    /// JSON to stdout plus rotated files in `log_dir`.
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            log_dir: Some(log_dir),
            stdout_format: LogFormat::Json,
            ..Default::default()
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Filter from `override`, else `RUST_LOG`, else `level` with noisy
/// dependencies held at WARN.
fn base_filter(level: &str, env_filter_override: Option<&str>) -> Result<EnvFilter, ParseError> {
    if let Some(filter) = env_filter_override {
        return EnvFilter::try_new(filter);
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::try_new(level)?
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("tokio_tungstenite=warn".parse()?)
        .add_directive("tungstenite=warn".parse()?))
}

fn stdout_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_filter(filter).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(false).with_filter(filter).boxed(),
    }
}

/// Initialize logging based on configuration.
///
/// Returns the `WorkerGuard`s of the file writers; keep them alive until
/// exit so buffered lines are flushed.
pub fn init_logging(
    config: &LogConfig,
    env_filter_override: Option<&str>,
) -> Result<Vec<WorkerGuard>, Box<dyn std::error::Error>> {
    let mut guards = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.enable_stdout {
        let filter = base_filter(&config.level, env_filter_override)?;
        layers.push(stdout_layer(config.stdout_format, filter));
    }

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;

        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "quote-watch.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_filter(base_filter(&config.level, env_filter_override)?)
                .boxed(),
        );

        let errors = RollingFileAppender::new(Rotation::DAILY, log_dir, "quote-watch-errors.log");
        let (writer, guard) = tracing_appender::non_blocking(errors);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::try_new(&config.error_level)?)
                .boxed(),
        );
    } else if let Some(log_file) = &config.log_file {
        let file = std::fs::File::create(log_file)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        guards.push(guard);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_filter(base_filter(&config.level, env_filter_override)?)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    if let Some(log_dir) = &config.log_dir {
        tracing::info!(dir = %log_dir.display(), "File logging enabled");
    }
    Ok(guards)
}
