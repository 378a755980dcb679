//! Configuration types for the server session and the client connection.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30000;

/// Default upper bound on a single message line (4 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Default command the client launches.
pub const DEFAULT_SERVER_COMMAND: &str = "compass-protocol";

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

fn default_command() -> String {
    DEFAULT_SERVER_COMMAND.to_string()
}

/// Limits applied by a server session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Timeout for a single tool call in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub tool_timeout_ms: u64,
    /// Longest accepted message line in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl SessionConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// How the client launches and talks to a server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Command to run (e.g., "compass-protocol", "./target/debug/compass-protocol").
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables to set for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Timeout for requests in milliseconds (default: 30000).
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            env: HashMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_session_defaults() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.tool_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parse_session_overrides() {
        let config: SessionConfig = toml::from_str(
            r#"
tool_timeout_ms = 500
max_message_bytes = 2048
"#,
        )
        .unwrap();
        assert_eq!(config.tool_timeout_ms, 500);
        assert_eq!(config.max_message_bytes, 2048);
    }

    #[test]
    fn parse_client_with_env() {
        let config: ClientConfig = toml::from_str(
            r#"
command = "../compass-protocol"
args = ["--verbose"]
env = { COMPASS_LOG = "debug" }
"#,
        )
        .unwrap();
        assert_eq!(config.command, "../compass-protocol");
        assert_eq!(config.args, ["--verbose"]);
        assert_eq!(config.env["COMPASS_LOG"], "debug");
        assert_eq!(config.timeout_ms, 30000); // default
    }

    #[test]
    fn default_client_launches_server_from_path() {
        assert_eq!(ClientConfig::default().command, "compass-protocol");
    }
}
