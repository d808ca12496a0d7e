//! Worker configuration.
//!
//! Settings are layered, later layers winning:
//!
//! ```text
//! stock defaults  →  resize-worker.toml  →  environment (.env included)
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [storage]
//! # connection_string = "Backend=local;Root=blobs"   # required to run jobs
//! source_container = "images"
//! destination_container = "resize-images"
//!
//! [queue]
//! spool_dir = "queue"
//! poll_interval_ms = 1000
//! max_delivery_count = 10
//!
//! [imaging]
//! quality = 85              # JPEG quality (1-100)
//! filter = "catmull-rom"    # triangle | catmull-rom | gaussian | lanczos3
//! max_pixels = 40000000     # largest output, width * height
//!
//! [logging]
//! level = "info"            # RUST_LOG overrides this
//! format = "pretty"         # pretty | json
//! ```
//!
//! ## Environment
//!
//! | Variable | Setting |
//! |---|---|
//! | `STORAGE_CONNECTION_STRING` | `storage.connection_string` |
//! | `RESIZE_WORKER_QUEUE_DIR` | `queue.spool_dir` |
//! | `RESIZE_WORKER_POLL_INTERVAL_MS` | `queue.poll_interval_ms` |
//! | `RESIZE_WORKER_JPEG_QUALITY` | `imaging.quality` |
//! | `RESIZE_WORKER_MAX_PIXELS` | `imaging.max_pixels` |
//! | `RESIZE_WORKER_LOG_LEVEL` | `logging.level` |
//! | `RESIZE_WORKER_LOG_FORMAT` | `logging.format` |
//!
//! Unknown keys are rejected to catch typos early. There is no
//! nearest-neighbor filter to select.

use crate::imaging::{DEFAULT_MAX_PIXELS, Quality, ResampleFilter};
use crate::storage::StorageConnection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "resize-worker.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid value for {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("No storage connection string: set STORAGE_CONNECTION_STRING or storage.connection_string")]
    MissingConnectionString,
}

/// Full worker configuration. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub imaging: ImagingConfig,
    pub logging: LoggingConfig,
}

impl WorkerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(conn) = &self.storage.connection_string {
            if conn.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "storage.connection_string must not be empty".into(),
                ));
            }
            let connection = StorageConnection::parse(conn)
                .map_err(|e| ConfigError::Validation(format!("storage.connection_string: {e}")))?;
            if !connection.is_shared() {
                return Err(ConfigError::Validation(format!(
                    "storage.connection_string: {conn:?} is private to this process; \
                     use Backend=local;Root=<dir>"
                )));
            }
        }
        for (key, name) in [
            ("storage.source_container", &self.storage.source_container),
            (
                "storage.destination_container",
                &self.storage.destination_container,
            ),
        ] {
            if name.is_empty() {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        if self.storage.source_container == self.storage.destination_container {
            return Err(ConfigError::Validation(
                "storage.source_container and storage.destination_container must differ".into(),
            ));
        }
        if !(1..=100).contains(&self.imaging.quality) {
            return Err(ConfigError::Validation(
                "imaging.quality must be 1-100".into(),
            ));
        }
        if self.imaging.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "imaging.max_pixels must be non-zero".into(),
            ));
        }
        if self.queue.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "queue.poll_interval_ms must be non-zero".into(),
            ));
        }
        if self.queue.max_delivery_count == 0 {
            return Err(ConfigError::Validation(
                "queue.max_delivery_count must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// The storage connection string. Running jobs without one is fatal.
    pub fn connection_string(&self) -> Result<&str, ConfigError> {
        self.storage
            .connection_string
            .as_deref()
            .ok_or(ConfigError::MissingConnectionString)
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.imaging.quality)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("STORAGE_CONNECTION_STRING") {
            self.storage.connection_string = Some(v);
        }
        if let Some(v) = lookup("RESIZE_WORKER_QUEUE_DIR") {
            self.queue.spool_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RESIZE_WORKER_POLL_INTERVAL_MS") {
            self.queue.poll_interval_ms = parse_env("RESIZE_WORKER_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("RESIZE_WORKER_JPEG_QUALITY") {
            self.imaging.quality = parse_env("RESIZE_WORKER_JPEG_QUALITY", &v)?;
        }
        if let Some(v) = lookup("RESIZE_WORKER_MAX_PIXELS") {
            self.imaging.max_pixels = parse_env("RESIZE_WORKER_MAX_PIXELS", &v)?;
        }
        if let Some(v) = lookup("RESIZE_WORKER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("RESIZE_WORKER_LOG_FORMAT") {
            self.logging.format = match v.trim().to_ascii_lowercase().as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                other => {
                    return Err(ConfigError::Env {
                        var: "RESIZE_WORKER_LOG_FORMAT",
                        message: format!("expected pretty or json, got {other:?}"),
                    });
                }
            };
        }
        Ok(())
    }
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: e.to_string(),
    })
}

/// Blob storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// `Backend=local;Root=<dir>`.
    pub connection_string: Option<String>,
    pub source_container: String,
    pub destination_container: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            source_container: crate::worker::SOURCE_CONTAINER.to_string(),
            destination_container: crate::worker::DESTINATION_CONTAINER.to_string(),
        }
    }
}

/// Spool-directory queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub spool_dir: PathBuf,
    /// Sleep between polls of an empty queue.
    pub poll_interval_ms: u64,
    /// Deliveries before a message is moved to `dead-letter/`.
    pub max_delivery_count: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("queue"),
            poll_interval_ms: 1000,
            max_delivery_count: 10,
        }
    }
}

/// Resize and encode settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagingConfig {
    /// JPEG encoding quality (1 = worst, 100 = best).
    pub quality: u8,
    pub filter: ResampleFilter,
    /// Largest output accepted, as `width * height`.
    pub max_pixels: u64,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
            filter: ResampleFilter::default(),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `resize_worker=debug`.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(WorkerConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value. `Ok(None)` if it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Layer file and environment over the defaults, then validate.
pub fn load_config_with_env(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<WorkerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(path)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let mut config: WorkerConfig = merged.try_into()?;
    config.apply_env(lookup)?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path` and the process environment.
pub fn load_config(path: &Path) -> Result<WorkerConfig, ConfigError> {
    load_config_with_env(path, |var| std::env::var(var).ok())
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Resize Worker Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Environment variables (and a .env file) override this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Blob storage
# ---------------------------------------------------------------------------
[storage]
# Required to run jobs; usually supplied as STORAGE_CONNECTION_STRING.
#   Backend=local;Root=<dir>   containers are directories under <dir>
# Backend=memory is refused: nothing outside the worker could upload to it.
# connection_string = "Backend=local;Root=blobs"

# Container the source images are read from.
source_container = "images"

# Container resized images are written to, as resize_<source name>.
destination_container = "resize-images"

# ---------------------------------------------------------------------------
# Message queue
# ---------------------------------------------------------------------------
[queue]
# Spool directory holding pending messages (RESIZE_WORKER_QUEUE_DIR).
spool_dir = "queue"

# How long to sleep when the queue is empty, in milliseconds.
poll_interval_ms = 1000

# Deliveries before a failing message is moved to dead-letter/.
max_delivery_count = 10

# ---------------------------------------------------------------------------
# Imaging
# ---------------------------------------------------------------------------
[imaging]
# JPEG encoding quality (1 = worst, 100 = best). PNG and GIF ignore it.
quality = 85

# Resampling filter, applied in linear light:
# triangle | catmull-rom | gaussian | lanczos3
filter = "catmull-rom"

# Largest output image accepted, as width * height (RESIZE_WORKER_MAX_PIXELS).
# Resizing holds about 16 bytes per output pixel; larger jobs fail.
max_pixels = 40000000

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# Filter directive; RUST_LOG takes precedence when set.
level = "info"

# pretty (human readable) or json (one object per line).
format = "pretty"
"##
}
