//! TOML configuration of the transmitter and its remotes.
//!
//! ```toml
//! [transmitter]
//! log_level = "info"
//! establish_period_ms = 2000
//! retry_period_ms = 5000
//!
//! [[remote]]
//! model = "transmitter_1"
//! address = "192.168.2.11"
//! port = 34400
//! width = "1920"
//! height = "720"
//! ```
//!
//! # Lenient numbers (for beginners)
//!
//! Remote geometry has historically been written both as TOML integers and
//! as quoted strings.  [`NumberOrText`] accepts either form through
//! `#[serde(untagged)]`: serde tries each variant in order and keeps the
//! first that fits.  A geometry value that is not a number is treated as 0,
//! which selects the default output mode.  A port must be a valid number;
//! anything else is reported as [`ConfigError::InvalidPort`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use transmitter_core::domain::status::{ESTABLISH_PERIOD, RETRY_PERIOD};
use transmitter_core::Endpoint;

use crate::application::remote::RemoteDescriptor;
use crate::application::transmitter::TransmitterOptions;

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

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("remote {model:?}: invalid port {value}")]
    InvalidPort { model: String, value: String },

    #[error("remote {model:?}: no address configured")]
    MissingAddress { model: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub transmitter: TransmitterSection,
    #[serde(default, rename = "remote")]
    pub remotes: Vec<RemoteEntry>,
}

/// Process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransmitterSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_establish_period_ms")]
    pub establish_period_ms: u64,
    #[serde(default = "default_retry_period_ms")]
    pub retry_period_ms: u64,
    /// Upper bound on one TCP connect.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Upper bound on the capability negotiation roundtrip.
    #[serde(default = "default_roundtrip_timeout_ms")]
    pub roundtrip_timeout_ms: u64,
}

/// A configured number that may be written as an integer or a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(i64),
    Text(String),
}

impl NumberOrText {
    fn parse<N: TryFrom<i64> + std::str::FromStr>(&self) -> Option<N> {
        match self {
            NumberOrText::Number(n) => N::try_from(*n).ok(),
            NumberOrText::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Geometry value; anything unparsable is 0.
    pub fn as_dimension(&self) -> i32 {
        self.parse().unwrap_or(0)
    }
}

impl std::fmt::Display for NumberOrText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberOrText::Number(n) => write!(f, "{n}"),
            NumberOrText::Text(s) => write!(f, "{s:?}"),
        }
    }
}

/// One `[[remote]]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteEntry {
    /// Display model name; also names the remote's output and seat.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: NumberOrText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<NumberOrText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<NumberOrText>,
}

impl RemoteEntry {
    /// Validates the entry and converts it to a remote descriptor.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingAddress`] for an empty address and
    /// [`ConfigError::InvalidPort`] for a port that is not in `1..=65535`.
    pub fn to_descriptor(&self) -> Result<RemoteDescriptor, ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::MissingAddress { model: self.model.clone() });
        }
        let port = self
            .port
            .parse::<u16>()
            .filter(|port| *port != 0)
            .ok_or_else(|| ConfigError::InvalidPort {
                model: self.model.clone(),
                value: self.port.to_string(),
            })?;
        Ok(RemoteDescriptor {
            model: self.model.clone(),
            endpoint: Endpoint::new(self.address.trim(), port),
            width: self.width.as_ref().map_or(0, NumberOrText::as_dimension),
            height: self.height.as_ref().map_or(0, NumberOrText::as_dimension),
        })
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_establish_period_ms() -> u64 {
    ESTABLISH_PERIOD.as_millis() as u64
}
fn default_retry_period_ms() -> u64 {
    RETRY_PERIOD.as_millis() as u64
}
fn default_connect_timeout_ms() -> u64 {
    1000
}
fn default_roundtrip_timeout_ms() -> u64 {
    3000
}
fn default_model() -> String {
    "transmitter_1".to_string()
}
fn default_port() -> NumberOrText {
    NumberOrText::Number(34400)
}

impl Default for TransmitterSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            establish_period_ms: default_establish_period_ms(),
            retry_period_ms: default_retry_period_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            roundtrip_timeout_ms: default_roundtrip_timeout_ms(),
        }
    }
}

impl TransmitterSection {
    pub fn options(&self) -> TransmitterOptions {
        TransmitterOptions {
            establish_period: Duration::from_millis(self.establish_period_ms),
            retry_period: Duration::from_millis(self.retry_period_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn roundtrip_timeout(&self) -> Duration {
        Duration::from_millis(self.roundtrip_timeout_ms)
    }
}

impl AppConfig {
    /// Descriptors of every configured remote, in file order.
    ///
    /// # Errors
    ///
    /// The first invalid `[[remote]]` entry.
    pub fn descriptors(&self) -> Result<Vec<RemoteDescriptor>, ConfigError> {
        self.remotes.iter().map(RemoteEntry::to_descriptor).collect()
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` (no
/// remotes) if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io { path: path.to_path_buf(), source: e }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
