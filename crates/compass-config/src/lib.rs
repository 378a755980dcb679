//! Layered TOML configuration for Compass Protocol.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use compass_mcp::{ClientConfig, SessionConfig};
use compass_types::{ConfigError, Implementation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The name the server reports in its handshake.
pub const DEFAULT_SERVER_NAME: &str = "compass-protocol";

/// Smallest accepted `max_message_bytes`.
pub const MIN_MESSAGE_BYTES: usize = 1024;

/// Resolved configuration for a server or client process.
#[derive(Debug, Clone)]
pub struct CompassConfig {
    /// Name and version the server reports. Fixed for the life of the process.
    pub server: Implementation,
    pub session: SessionConfig,
    pub client: ClientConfig,
    pub log_level: Option<String>,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub log: LogSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub name: Option<String>,
    pub version: Option<String>,
    pub tool_timeout_ms: Option<u64>,
    pub max_message_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    pub level: Option<String>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_version: Option<String>,
    pub tool_timeout_ms: Option<u64>,
    pub server_command: Option<String>,
    pub server_args: Option<Vec<String>>,
    pub client_timeout_ms: Option<u64>,
}

impl CompassConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.compass/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        Self::resolve(overrides, settings, |key| std::env::var(key).ok(), config_dir)
    }

    /// Merge already-read sources. `env` looks up an environment variable.
    pub fn resolve(
        overrides: CliOverrides,
        settings: SettingsFile,
        env: impl Fn(&str) -> Option<String>,
        config_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        // Resolve server version: CLI > env > config file > crate version
        let version = overrides
            .server_version
            .or_else(|| env("COMPASS_VERSION"))
            .or(settings.server.version)
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        let name = settings
            .server
            .name
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());

        let env_timeout = match env("COMPASS_TOOL_TIMEOUT_MS") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue {
                    key: "COMPASS_TOOL_TIMEOUT_MS".into(),
                    message: e.to_string(),
                }
            })?),
            None => None,
        };

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            tool_timeout_ms: overrides
                .tool_timeout_ms
                .or(env_timeout)
                .or(settings.server.tool_timeout_ms)
                .unwrap_or(defaults.tool_timeout_ms),
            max_message_bytes: settings
                .server
                .max_message_bytes
                .unwrap_or(defaults.max_message_bytes),
        };

        let mut client = settings.client.unwrap_or_default();
        if let Some(command) = overrides.server_command {
            client.command = command;
        }
        if let Some(args) = overrides.server_args {
            client.args = args;
        }
        if let Some(timeout_ms) = overrides.client_timeout_ms {
            client.timeout_ms = timeout_ms;
        }

        let log_level = env("COMPASS_LOG").or(settings.log.level);

        let config = CompassConfig {
            server: Implementation::new(name, version),
            session,
            client,
            log_level,
            config_dir,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "server.name".into(),
                message: "must not be empty".into(),
            });
        }
        if self.session.tool_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.tool_timeout_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.session.max_message_bytes < MIN_MESSAGE_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "server.max_message_bytes".into(),
                message: format!("must be at least {MIN_MESSAGE_BYTES}"),
            });
        }
        if self.client.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "client.timeout_ms".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.client.command.trim().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "client.command".into(),
            });
        }
        Ok(())
    }
}

/// Get the Compass config directory path (~/.compass/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("COMPASS_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".compass")
}

/// Load and parse a TOML settings file, returning defaults on any error.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_settings(path, &content).unwrap_or_else(|e| {
            tracing::warn!("{e}");
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

/// Parse settings TOML read from `path`.
pub fn parse_settings(path: &Path, content: &str) -> Result<SettingsFile, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.message().to_string(),
    })
}
