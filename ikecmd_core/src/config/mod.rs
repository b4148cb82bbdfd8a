//! Configuration management module for ikecmd.
//!
//! Settings come from a TOML file, then `IKECMD_*` environment variables,
//! then the command line (applied by the client).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::connection::{Profile, TrafficSelector, PORT_MAX, PORT_MIN, PROTOCOL_ANY};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] io::Error),

    /// Error parsing TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Error serializing configuration to TOML
    #[error("Failed to serialize config to TOML: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// Missing required configuration value
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of plain text
    #[serde(default)]
    pub json: bool,

    /// Also write a daily rotated log file
    #[serde(default)]
    pub file: bool,

    /// Directory for log files (default: "./logs")
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            json: false,
            file: false,
            dir: default_log_dir(),
        }
    }
}

/// How to reach the tunnel daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DaemonConfig {
    /// Path of the daemon's control socket
    #[serde(default = "default_socket")]
    pub socket: String,

    /// Timeout for a single socket read or write, in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_socket() -> String {
    "/var/run/ikecmd/daemon.sock".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            socket: default_socket(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DaemonConfig {
    /// Returns the I/O timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Connection settings used when the command line leaves them out.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ConnectionDefaults {
    /// Host to connect to
    pub host: Option<String>,

    /// Our identity
    pub identity: Option<String>,

    /// Identity expected from the server
    pub remote_identity: Option<String>,

    /// Connection profile name
    pub profile: Option<String>,

    /// Path to the private key
    pub private_key: Option<String>,

    /// Local traffic selectors (CIDRs)
    #[serde(default)]
    pub local_ts: Vec<String>,

    /// Remote traffic selectors (CIDRs)
    #[serde(default)]
    pub remote_ts: Vec<String>,
}

/// Main configuration structure for ikecmd.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Log level (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Daemon connection configuration
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Connection defaults
    #[serde(default)]
    pub connection: ConnectionDefaults,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            logging: LoggingConfig::default(),
            daemon: DaemonConfig::default(),
            connection: ConnectionDefaults::default(),
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Config::default()
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.validate()?;

        // Environment variables take precedence over the file
        Self::apply_env_overrides(&mut config);
        config.validate()?;

        Ok(config)
    }

    /// Load `path` if given, otherwise the default location if it exists,
    /// otherwise built-in defaults (with environment overrides).
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_path();
        if default_path.exists() {
            return Self::load(default_path);
        }

        let mut config = Config::default();
        Self::apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.socket.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "daemon.socket".to_string(),
                message: "daemon socket path cannot be empty".to_string(),
            });
        }

        if self.daemon.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "daemon.timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if let Some(profile) = &self.connection.profile {
            if let Err(err) = profile.parse::<Profile>() {
                return Err(ConfigError::InvalidValue {
                    key: "connection.profile".to_string(),
                    message: err.to_string(),
                });
            }
        }

        for (key, list) in [
            ("connection.local_ts", &self.connection.local_ts),
            ("connection.remote_ts", &self.connection.remote_ts),
        ] {
            for cidr in list {
                if let Err(err) = TrafficSelector::from_cidr(cidr, PROTOCOL_ANY, PORT_MIN, PORT_MAX)
                {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides (prefix: IKECMD_)
    /// Example keys:
    /// - IKECMD_LOG_LEVEL, IKECMD_LOG_JSON, IKECMD_LOG_FILE, IKECMD_LOG_DIR
    /// - IKECMD_DAEMON_SOCKET, IKECMD_DAEMON_TIMEOUT_SECS
    /// - IKECMD_CONNECTION_HOST, IKECMD_CONNECTION_IDENTITY, IKECMD_CONNECTION_REMOTE_IDENTITY,
    ///   IKECMD_CONNECTION_PROFILE, IKECMD_CONNECTION_PRIVATE_KEY
    /// - IKECMD_CONNECTION_LOCAL_TS, IKECMD_CONNECTION_REMOTE_TS (comma separated)
    fn apply_env_overrides(cfg: &mut Config) {
        use std::env;

        fn parse_bool(s: &str) -> Option<bool> {
            match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Some(true),
                "false" | "0" | "no" | "n" => Some(false),
                _ => None,
            }
        }
        fn split_csv(s: &str) -> Vec<String> {
            s.split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect()
        }
        fn non_empty(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.is_empty())
        }

        // Logging
        if let Some(v) = non_empty("IKECMD_LOG_LEVEL") {
            cfg.log_level = v;
        }
        if let Some(b) = non_empty("IKECMD_LOG_JSON").as_deref().and_then(parse_bool) {
            cfg.logging.json = b;
        }
        if let Some(b) = non_empty("IKECMD_LOG_FILE").as_deref().and_then(parse_bool) {
            cfg.logging.file = b;
        }
        if let Some(v) = non_empty("IKECMD_LOG_DIR") {
            cfg.logging.dir = v;
        }

        // Daemon
        if let Some(v) = non_empty("IKECMD_DAEMON_SOCKET") {
            cfg.daemon.socket = v;
        }
        if let Some(n) = non_empty("IKECMD_DAEMON_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            cfg.daemon.timeout_secs = n;
        }

        // Connection
        if let Some(v) = non_empty("IKECMD_CONNECTION_HOST") {
            cfg.connection.host = Some(v);
        }
        if let Some(v) = non_empty("IKECMD_CONNECTION_IDENTITY") {
            cfg.connection.identity = Some(v);
        }
        if let Some(v) = non_empty("IKECMD_CONNECTION_REMOTE_IDENTITY") {
            cfg.connection.remote_identity = Some(v);
        }
        if let Some(v) = non_empty("IKECMD_CONNECTION_PROFILE") {
            cfg.connection.profile = Some(v);
        }
        if let Some(v) = non_empty("IKECMD_CONNECTION_PRIVATE_KEY") {
            cfg.connection.private_key = Some(v);
        }
        if let Some(v) = non_empty("IKECMD_CONNECTION_LOCAL_TS") {
            cfg.connection.local_ts = split_csv(&v);
        }
        if let Some(v) = non_empty("IKECMD_CONNECTION_REMOTE_TS") {
            cfg.connection.remote_ts = split_csv(&v);
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("ikecmd").join("config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }
}
