//! Server configuration.

use std::time::Duration;

use linecast_settings::LinecastSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the linecast server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`, all interfaces).
    pub host: String,
    /// Port to bind (default `5000`; `0` auto-assigns).
    pub port: u16,
    /// Maximum simultaneously registered connections.
    pub max_connections: usize,
    /// Per-connection outbound queue capacity, in lines.
    pub outbound_buffer: usize,
    /// Longest accepted inbound line, in bytes.
    pub max_line_length: usize,
    /// Whether a sender receives its own lines back.
    pub echo_to_sender: bool,
    /// Line that disconnects its sender instead of being broadcast.
    pub disconnect_sentinel: Option<String>,
    /// Read deadline in seconds; `0` disables it.
    pub idle_timeout_secs: u64,
    /// Deadline for writing one line to a peer, in seconds.
    pub write_timeout_secs: u64,
    /// How long graceful shutdown waits for connections, in seconds.
    pub shutdown_timeout_secs: u64,
    /// Admin endpoint host.
    pub admin_host: String,
    /// Admin endpoint port; disabled when `None`.
    pub admin_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            max_connections: 1024,
            outbound_buffer: 1024,
            max_line_length: 64 * 1024,
            echo_to_sender: true,
            disconnect_sentinel: None,
            idle_timeout_secs: 0,
            write_timeout_secs: 10,
            shutdown_timeout_secs: 5,
            admin_host: "127.0.0.1".into(),
            admin_port: None,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &LinecastSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            outbound_buffer: server.outbound_buffer,
            max_line_length: server.max_line_length,
            echo_to_sender: server.echo_to_sender,
            disconnect_sentinel: server.disconnect_sentinel.clone(),
            idle_timeout_secs: server.idle_timeout_secs,
            write_timeout_secs: server.write_timeout_secs,
            shutdown_timeout_secs: server.shutdown_timeout_secs,
            admin_host: settings.admin.host.clone(),
            admin_port: settings.admin.port,
        }
    }

    /// Listening address as `host:port`.
    pub fn bind_addr(&self) -> String {
        join_host_port(&self.host, self.port)
    }

    /// Admin listening address, if the admin endpoint is enabled.
    pub fn admin_addr(&self) -> Option<String> {
        self.admin_port
            .map(|port| join_host_port(&self.admin_host, port))
    }

    /// Read deadline, if enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Per-line write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }

    /// Graceful shutdown deadline.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Bracket IPv6 literals so the result parses as a socket address.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
