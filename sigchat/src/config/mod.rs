//! Configuration for the `SigChat` client.
//!
//! Layered resolution with the following priority (highest first):
//! 1. CLI arguments (with environment-variable fallback via clap `env`)
//! 2. TOML config file (`~/.config/sigchat/config.toml`)
//! 3. Compiled defaults
//!
//! A missing default config file is not an error (defaults are used). An
//! explicit `--config` path that does not exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionConfig;

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
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    session: SessionFileConfig,
    auth: AuthFileConfig,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    op_timeout_ms: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[auth]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthFileConfig {
    token: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for any pending asynchronous signaling operation.
    pub op_timeout: Duration,
    /// Capacity of the backend event channel.
    pub event_buffer: usize,
    /// Token passed to the backend on login.
    pub token: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(10_000),
            event_buffer: 64,
            token: "_no_need_token".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit `--config` file cannot be
    /// read, or if a config file cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without touching the filesystem.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            op_timeout: cli
                .timeout_ms
                .or(file.session.op_timeout_ms)
                .map_or(defaults.op_timeout, Duration::from_millis),
            event_buffer: file.session.event_buffer.unwrap_or(defaults.event_buffer),
            token: cli
                .token
                .clone()
                .or_else(|| file.auth.token.clone())
                .unwrap_or(defaults.token),
        }
    }

    /// Build the controller's [`SessionConfig`] from this configuration.
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            op_timeout: self.op_timeout,
            token: self.token.clone(),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal chat client over an asynchronous signaling backend")]
pub struct CliArgs {
    /// Login token handed to the signaling backend.
    #[arg(long, env = "SIGCHAT_TOKEN")]
    pub token: Option<String>,

    /// Timeout for pending signaling operations, in milliseconds.
    #[arg(long, env = "SIGCHAT_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Path to config file (default: `~/.config/sigchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "SIGCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/sigchat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("sigchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
