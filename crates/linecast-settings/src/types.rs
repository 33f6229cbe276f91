//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial; missing fields take their compiled default.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 6000, "echoToSender": false },
///   "admin": { "port": 9100 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinecastSettings {
    /// Broadcast server settings.
    pub server: ServerSettings,
    /// Admin HTTP endpoint settings.
    pub admin: AdminSettings,
    /// Console client settings.
    pub client: ClientSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl LinecastSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be at least 1".into(),
            ));
        }
        if server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundBuffer must be at least 1".into(),
            ));
        }
        if server.max_line_length == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxLineLength must be at least 1".into(),
            ));
        }
        if server.write_timeout_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "server.writeTimeoutSecs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Broadcast server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listening port.
    pub port: u16,
    /// Maximum simultaneously registered connections.
    pub max_connections: usize,
    /// Per-connection outbound queue capacity, in lines.
    pub outbound_buffer: usize,
    /// Longest accepted inbound line, in bytes.
    pub max_line_length: usize,
    /// Whether a sender receives its own lines back.
    pub echo_to_sender: bool,
    /// Line that, when received, disconnects the sender instead of being broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disconnect_sentinel: Option<String>,
    /// Read deadline in seconds; `0` disables it.
    pub idle_timeout_secs: u64,
    /// Deadline for writing one line to a peer, in seconds.
    pub write_timeout_secs: u64,
    /// How long shutdown waits for connections to drain, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_connections: 1024,
            outbound_buffer: 1024,
            max_line_length: 64 * 1024,
            echo_to_sender: true,
            disconnect_sentinel: None,
            idle_timeout_secs: 0,
            write_timeout_secs: 10,
            shutdown_timeout_secs: 5,
        }
    }
}

/// Admin HTTP endpoint (`/health`, `/metrics`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminSettings {
    /// Bind address for the admin endpoint.
    pub host: String,
    /// Admin port; the endpoint is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
        }
    }
}

/// Console client settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Display name used when `--name` is not given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Console input that leaves the chat.
    pub exit_command: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            name: None,
            connect_timeout_secs: 10,
            exit_command: "exit".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence when set.
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name (case-insensitive).
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}
