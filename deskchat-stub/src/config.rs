//! Configuration system for the `DeskChat` stub backend.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/deskchat-stub/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use deskchat_proto::message::{DEFAULT_COUNTERPART_ROLE, DEFAULT_SELF_ROLE};

/// Errors that can occur when loading stub configuration.
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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure for the stub.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StubConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the stub config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    token: Option<String>,
    max_history: Option<usize>,
    self_role: Option<String>,
    counterpart_role: Option<String>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the stub server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "DeskChat stub support backend")]
pub struct StubCliArgs {
    /// Address to bind the stub server to.
    #[arg(short, long, env = "DESKCHAT_STUB_ADDR")]
    pub bind: Option<String>,

    /// Bearer token clients must present.
    #[arg(long, env = "DESKCHAT_STUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to config file (default: `~/.config/deskchat-stub/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of records kept in the conversation.
    #[arg(long)]
    pub max_history: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DESKCHAT_STUB_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved stub server configuration.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Address to bind the server to (e.g., `127.0.0.1:8787`).
    pub bind_addr: String,
    /// Bearer token required on every call, if any.
    pub token: Option<String>,
    /// Maximum number of records kept before FIFO eviction.
    pub max_history: usize,
    /// Role stamped on records sent by the app user.
    pub self_role: String,
    /// Role stamped on injected desk replies.
    pub counterpart_role: String,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            token: None,
            max_history: 500,
            self_role: DEFAULT_SELF_ROLE.to_string(),
            counterpart_role: DEFAULT_COUNTERPART_ROLE.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl StubConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &StubCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `StubConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &StubCliArgs, file: &StubConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            token: cli.token.clone().or_else(|| file.server.token.clone()),
            max_history: cli
                .max_history
                .or(file.server.max_history)
                .unwrap_or(defaults.max_history),
            self_role: file
                .server
                .self_role
                .clone()
                .unwrap_or(defaults.self_role),
            counterpart_role: file
                .server
                .counterpart_role
                .clone()
                .unwrap_or(defaults.counterpart_role),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the stub.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<StubConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(StubConfigFile::default());
        };
        config_dir.join("deskchat-stub").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StubConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
