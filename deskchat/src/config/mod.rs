//! Configuration system for the `DeskChat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/deskchat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use deskchat_proto::message::{DEFAULT_SELF_ROLE, MAX_MESSAGE_LEN};

use crate::chat::message::DEFAULT_TIMESTAMP_FORMAT;
use crate::transport::http::BackendConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value is outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Name of the offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    backend: BackendFileConfig,
    chat: ChatFileConfig,
    ui: UiFileConfig,
}

/// `[backend]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BackendFileConfig {
    base_url: Option<String>,
    token: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// `[chat]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    poll_interval_ms: Option<u64>,
    self_role: Option<String>,
    event_buffer: Option<usize>,
    max_message_len: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Chat engine configuration (used by `ChatEngine` and the poller).
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Interval between history polls.
    pub poll_interval: Duration,
    /// Upper bound on any single backend call.
    pub request_timeout: Duration,
    /// Backend role value that marks the app user's messages.
    pub self_role: String,
    /// chrono format for message display times.
    pub timestamp_format: String,
    /// Maximum message length in characters.
    pub max_message_len: usize,
    /// Buffer size for the `ChatEvent` channel.
    pub event_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            self_role: DEFAULT_SELF_ROLE.to_string(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            max_message_len: MAX_MESSAGE_LEN,
            event_buffer: 64,
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Base URL of the backend API.
    pub base_url: Option<String>,
    /// Bearer token for the backend.
    pub token: Option<String>,
    /// Chat engine settings.
    pub chat: ChatConfig,
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path
    /// (`~/.config/deskchat/config.toml`) is tried and silently ignored if
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if a resolved value is out of range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = ChatConfig::default();

        Self {
            base_url: cli
                .base_url
                .clone()
                .or_else(|| file.backend.base_url.clone()),
            token: cli.token.clone().or_else(|| file.backend.token.clone()),
            chat: ChatConfig {
                poll_interval: cli
                    .poll_interval_ms
                    .or(file.chat.poll_interval_ms)
                    .map_or(defaults.poll_interval, Duration::from_millis),
                request_timeout: file
                    .backend
                    .request_timeout_secs
                    .map_or(defaults.request_timeout, Duration::from_secs),
                self_role: file
                    .chat
                    .self_role
                    .clone()
                    .unwrap_or(defaults.self_role),
                timestamp_format: cli
                    .timestamp_format
                    .clone()
                    .or_else(|| file.ui.timestamp_format.clone())
                    .unwrap_or(defaults.timestamp_format),
                max_message_len: file
                    .chat
                    .max_message_len
                    .unwrap_or(defaults.max_message_len),
                event_buffer: file.chat.event_buffer.unwrap_or(defaults.event_buffer),
            },
        }
    }

    /// Checks ranges the rest of the client relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero poll interval, request
    /// timeout, message length or event buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |field| ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        };
        if self.chat.poll_interval.is_zero() {
            return Err(zero("poll_interval_ms"));
        }
        if self.chat.request_timeout.is_zero() {
            return Err(zero("request_timeout_secs"));
        }
        if self.chat.max_message_len == 0 {
            return Err(zero("max_message_len"));
        }
        if self.chat.event_buffer == 0 {
            return Err(zero("event_buffer"));
        }
        Ok(())
    }

    /// Build a [`BackendConfig`] from this configuration.
    ///
    /// Returns `None` if no base URL is configured (offline mode).
    #[must_use]
    pub fn to_backend_config(&self) -> Option<BackendConfig> {
        let base_url = self.base_url.clone().filter(|u| !u.trim().is_empty())?;
        Some(BackendConfig {
            base_url,
            token: self.token.clone(),
            request_timeout: self.chat.request_timeout,
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Support desk chat client")]
pub struct CliArgs {
    /// Base URL of the backend API.
    #[arg(long, env = "DESKCHAT_URL")]
    pub base_url: Option<String>,

    /// Bearer token for the backend API.
    #[arg(long, env = "DESKCHAT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to config file (default: `~/.config/deskchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interval between history polls, in milliseconds.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Timestamp display format (chrono format string).
    #[arg(long)]
    pub timestamp_format: Option<String>,

    /// Run against an in-process backend instead of the network.
    #[arg(long)]
    pub offline: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DESKCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/deskchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("deskchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
