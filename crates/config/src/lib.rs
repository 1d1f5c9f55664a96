//! Ember Configuration
//!
//! TOML-based configuration with sensible defaults. A minimal config should
//! just work - only specify what you need to change.
//!
//! # Example Minimal Config
//!
//! ```toml
//! [buffer]
//! app = 524288
//!
//! [persist]
//! directory = "/data/log/ember"
//! ```
//!
//! # Sections
//!
//! - `[buffer]`: per-type byte budgets for the in-memory buffer
//! - `[ingress]` / `[control]`: unix socket path overrides
//! - `[persist]`: defaults for persist jobs (directory, rotation, pacing)
//! - `[log]`: the daemon's own logging

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use ember_protocol::{LOG_TYPE_MAX, CONTROL_SOCKET_NAME, INPUT_SOCKET_NAME, SOCKET_FILE_DIR};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML didn't parse.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main configuration structure.
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// In-memory buffer budgets.
    pub buffer: BufferConfig,

    /// Log ingress socket.
    pub ingress: IngressConfig,

    /// Control socket.
    pub control: ControlConfig,

    /// Persist job defaults.
    pub persist: PersistConfig,

    /// The daemon's own logging.
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(text.parse()?)
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

/// Per-type byte budgets for the in-memory buffer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Application log budget.
    pub app: usize,
    /// Init log budget.
    pub init: usize,
    /// Security log budget.
    pub sec: usize,
    /// Core log budget.
    pub core: usize,
    /// Kernel message budget.
    pub kmsg: usize,
}

/// Default per-type budget (256 KiB).
const DEFAULT_TYPE_BUDGET: usize = 262_144;

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            app: DEFAULT_TYPE_BUDGET,
            init: DEFAULT_TYPE_BUDGET,
            sec: DEFAULT_TYPE_BUDGET,
            core: DEFAULT_TYPE_BUDGET,
            kmsg: DEFAULT_TYPE_BUDGET,
        }
    }
}

impl BufferConfig {
    /// Budgets as an array indexed by log type.
    pub fn limits(&self) -> [usize; LOG_TYPE_MAX] {
        [self.app, self.init, self.sec, self.core, self.kmsg]
    }
}

/// Log ingress socket settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    /// Socket path; defaults to the platform socket directory.
    pub socket_path: PathBuf,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(SOCKET_FILE_DIR).join(INPUT_SOCKET_NAME),
        }
    }
}

/// Control socket settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Socket path; defaults to the platform socket directory.
    pub socket_path: PathBuf,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(SOCKET_FILE_DIR).join(CONTROL_SOCKET_NAME),
        }
    }
}

/// Defaults applied to persist jobs when the client omits parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Directory for output files when the client passes a bare file name.
    pub directory: PathBuf,
    /// Nominal size of one output file.
    pub file_size: u32,
    /// Number of output file slots.
    pub file_num: u32,
    /// Worker idle timeout in seconds.
    pub sleep_secs: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/data/log/ember"),
            file_size: 4 * 1024 * 1024,
            file_num: 10,
            sleep_secs: 3,
        }
    }
}

/// Log level for the daemon's own output.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level - very verbose.
    Trace,
    /// Debug level - debugging information.
    Debug,
    /// Info level - normal operation (default).
    #[default]
    Info,
    /// Warn level - warnings only.
    Warn,
    /// Error level - errors only.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// The daemon's own logging.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum level emitted.
    pub level: LogLevel,
}
