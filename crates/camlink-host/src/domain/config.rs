//! TOML-based host configuration.
//!
//! Every field has a serde default so a partial (or absent) config file
//! still yields a working configuration; unknown newer fields in an old
//! file simply fall back to their defaults. Example:
//!
//! ```toml
//! [connect]
//! adb_path = "adb"
//! port_start = 6000
//! port_count = 100
//!
//! [timeouts]
//! base_secs = 20
//!
//! [log]
//! filter = "camlink=debug"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    #[serde(default)]
    pub connect: ConnectConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Port-forwarding and lock-acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectConfig {
    /// Path to the port-forwarding tool binary.
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    /// Control port the service listens on, device side.
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,
    /// First host port in the forwarding pool.
    #[serde(default = "default_port_start")]
    pub port_start: u16,
    /// Number of host ports in the pool. The lock port sits just past the
    /// pool at `port_start + port_count` and is never used for data.
    #[serde(default = "default_port_count")]
    pub port_count: u16,
    /// Attempts to bind the lock port before giving up.
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    /// Fixed wait between lock attempts, in milliseconds.
    #[serde(default = "default_lock_backoff_ms")]
    pub lock_backoff_ms: u64,
}

impl ConnectConfig {
    /// The cross-process mutex port, derived from the pool bounds.
    pub fn lock_port(&self) -> u16 {
        self.port_start + self.port_count
    }
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            remote_port: default_remote_port(),
            port_start: default_port_start(),
            port_count: default_port_count(),
            lock_retries: default_lock_retries(),
            lock_backoff_ms: default_lock_backoff_ms(),
        }
    }
}

/// Socket timeout settings, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    /// Baseline timeout for every socket operation.
    #[serde(default = "default_base_secs")]
    pub base_secs: u64,
    /// Additional slack for slow queries and warm-up bursts.
    #[serde(default = "default_extra_secs")]
    pub extra_secs: u64,
    /// Timeout for performance-measurement operations.
    #[serde(default = "default_perf_secs")]
    pub perf_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            base_secs: default_base_secs(),
            extra_secs: default_extra_secs(),
            perf_secs: default_perf_secs(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. `"info"` or `"camlink=debug"`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl HostConfig {
    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads a configuration file, falling back to the defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not
    /// found", and [`ConfigError::Parse`] when the file is not valid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

// ── Serde default functions ───────────────────────────────────────────────────

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_remote_port() -> u16 {
    6000
}

fn default_port_start() -> u16 {
    6000
}

fn default_port_count() -> u16 {
    100
}

fn default_lock_retries() -> u32 {
    100
}

fn default_lock_backoff_ms() -> u64 {
    50
}

fn default_base_secs() -> u64 {
    20
}

fn default_extra_secs() -> u64 {
    5
}

fn default_perf_secs() -> u64 {
    40
}

fn default_log_filter() -> String {
    "info".to_string()
}
