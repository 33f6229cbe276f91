//! # linecast
//!
//! Line broadcast server and console chat client.
//!
//! - `linecast serve` runs the server.
//! - `linecast host --name N` runs the server and chats on it locally.
//! - `linecast join --name N <ADDR>` chats on a remote server.

#![deny(unsafe_code)]

mod console;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use linecast_client::format::{system_message_now, welcome_host, welcome_join};
use linecast_client::{ClientConfig, LineClient, local_ipv4};
use linecast_server::{LinecastServer, ServerConfig};
use linecast_settings::{LinecastSettings, LoadedSettings, LogLevel, RejectedOverride};
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::console::{ConsoleExit, ConsoleOptions};

/// Line broadcast server and console chat client.
#[derive(Parser, Debug)]
#[command(name = "linecast", version, about = "Line broadcast server and console chat client")]
struct Cli {
    /// Settings file (defaults to `~/.linecast/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the broadcast server.
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
        /// Serve `/health` and `/metrics` on this port.
        #[arg(long)]
        admin_port: Option<u16>,
    },
    /// Run the server and chat on it from this terminal.
    Host {
        /// Display name.
        #[arg(long)]
        name: Option<String>,
        /// Port to bind.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chat on a remote server.
    Join {
        /// Display name.
        #[arg(long)]
        name: Option<String>,
        /// Server address: `IP`, `IP:PORT` or `HOST:PORT`.
        addr: String,
    },
}

fn parse_log_level(val: &str) -> std::result::Result<LogLevel, String> {
    LogLevel::parse(val).ok_or_else(|| format!("unknown log level: {val}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let LoadedSettings {
        mut settings,
        rejected,
    } = match &cli.config {
        Some(path) => linecast_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => linecast_settings::load_settings().context("Failed to load settings")?,
    };
    apply_logging_flags(&mut settings, &cli);
    linecast_telemetry::init_logging(&settings.logging).context("Failed to initialize logging")?;
    report_rejected_overrides(&rejected);

    match cli.command {
        Command::Serve {
            host,
            port,
            admin_port,
        } => {
            let mut config = ServerConfig::from_settings(&settings);
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if admin_port.is_some() {
                config.admin_port = admin_port;
            }
            serve(config).await
        }
        Command::Host { name, port } => {
            let name = display_name(name, &settings)?;
            let mut config = ServerConfig::from_settings(&settings);
            if let Some(port) = port {
                config.port = port;
            }
            host(config, name, &settings).await
        }
        Command::Join { name, addr } => {
            let name = display_name(name, &settings)?;
            join(&addr, name, &settings).await
        }
    }
}

/// Command-line logging flags override the settings file. Console modes stay
/// quiet unless a level was asked for, so logs do not interleave with chat.
fn apply_logging_flags(settings: &mut LinecastSettings, cli: &Cli) {
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    } else if !matches!(cli.command, Command::Serve { .. }) {
        settings.logging.level = LogLevel::Warn;
    }
    if cli.log_json {
        settings.logging.json = true;
    }
}

/// Env overrides are parsed before logging exists, so report them here.
fn report_rejected_overrides(rejected: &[RejectedOverride]) {
    for r in rejected {
        warn!(key = r.key, value = %r.value, expected = r.expected, "invalid env var, ignoring");
    }
}

fn display_name(flag: Option<String>, settings: &LinecastSettings) -> Result<String> {
    let name = flag
        .or_else(|| settings.client.name.clone())
        .map(|n| n.trim().to_string())
        .unwrap_or_default();
    if name.is_empty() {
        bail!("a display name is required (--name or client.name in settings)");
    }
    if name.contains(['\n', '\r']) {
        bail!("display name must be a single line");
    }
    Ok(name)
}

fn start_server(config: ServerConfig) -> LinecastServer {
    let server = LinecastServer::new(config);
    match linecast_telemetry::metrics::install_recorder() {
        Ok(handle) => server.with_metrics(handle),
        Err(error) => {
            warn!(%error, "metrics disabled");
            server
        }
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    let server = start_server(config);
    let (addr, accept) = server.listen().await.context("Failed to start server")?;
    let admin = server
        .listen_admin()
        .await
        .context("Failed to start admin endpoint")?;
    if let Some((admin_addr, _)) = &admin {
        info!(%admin_addr, "admin endpoint ready");
    }
    info!(%addr, "ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    if !server.shutdown_gracefully().await {
        warn!("some connections did not close in time");
    }
    let _ = accept.await;
    if let Some((_, handle)) = admin {
        let _ = handle.await;
    }
    Ok(())
}

async fn host(config: ServerConfig, name: String, settings: &LinecastSettings) -> Result<()> {
    let server = start_server(config);
    let (addr, accept) = server.listen().await.context("Failed to start server")?;

    let lan_ip = local_ipv4().await;
    let (client, inbound) = LineClient::connect(loopback_for(addr), &client_config(settings))
        .await
        .context("Failed to connect to local server")?;
    let options = ConsoleOptions {
        name,
        exit_command: settings.client.exit_command.clone(),
        greeting: Some(system_message_now(&welcome_host(&lan_ip.to_string()))),
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let exit = tokio::select! {
        exit = console::run(client, inbound, &options, stdin, tokio::io::stdout()) => Some(exit?),
        _ = tokio::signal::ctrl_c() => None,
    };
    info!(?exit, "console closed");

    if !server.shutdown_gracefully().await {
        warn!("some connections did not close in time");
    }
    let _ = accept.await;
    Ok(())
}

async fn join(addr: &str, name: String, settings: &LinecastSettings) -> Result<()> {
    let target = resolve_target(addr, settings.server.port);
    let (client, inbound) = LineClient::connect(target.as_str(), &client_config(settings))
        .await
        .with_context(|| format!("Error when connecting to the server at {target}"))?;
    let options = ConsoleOptions {
        name,
        exit_command: settings.client.exit_command.clone(),
        greeting: Some(system_message_now(&welcome_join(&target))),
    };

    let stdin = BufReader::new(tokio::io::stdin());
    let exit = tokio::select! {
        exit = console::run(client, inbound, &options, stdin, tokio::io::stdout()) => exit?,
        _ = tokio::signal::ctrl_c() => return Ok(()),
    };
    if exit == ConsoleExit::ServerClosed {
        bail!("server at {target} closed the connection");
    }
    Ok(())
}

fn client_config(settings: &LinecastSettings) -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_secs(settings.client.connect_timeout_secs.max(1)),
        ..ClientConfig::default()
    }
}

/// Address a local client should dial to reach a server bound to `bound`.
fn loopback_for(bound: SocketAddr) -> SocketAddr {
    let ip = match bound.ip() {
        IpAddr::V4(v4) if v4.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(v6) if v6.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, bound.port())
}

/// Accept a bare IP or host name, using `default_port` when none is given.
fn resolve_target(addr: &str, default_port: u16) -> String {
    let addr = addr.trim();
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    match addr.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, default_port).to_string(),
        Err(_) if addr.contains(':') => addr.to_string(),
        Err(_) => format!("{addr}:{default_port}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_bare_ipv4_uses_default_port() {
        assert_eq!(resolve_target("192.168.1.20", 5000), "192.168.1.20:5000");
    }

    #[test]
    fn resolve_keeps_explicit_port() {
        assert_eq!(resolve_target("10.0.0.1:6000", 5000), "10.0.0.1:6000");
        assert_eq!(resolve_target("chat.local:7000", 5000), "chat.local:7000");
    }

    #[test]
    fn resolve_bare_ipv6_is_bracketed() {
        assert_eq!(resolve_target("::1", 5000), "[::1]:5000");
    }

    #[test]
    fn resolve_hostname_uses_default_port() {
        assert_eq!(resolve_target(" chat.local ", 5000), "chat.local:5000");
    }

    #[test]
    fn loopback_replaces_unspecified() {
        let bound: SocketAddr = "0.0.0.0:5000".parse().unwrap();
        assert_eq!(loopback_for(bound), "127.0.0.1:5000".parse().unwrap());
        let bound: SocketAddr = "[::]:5000".parse().unwrap();
        assert_eq!(loopback_for(bound), "[::1]:5000".parse().unwrap());
        let bound: SocketAddr = "10.1.2.3:5000".parse().unwrap();
        assert_eq!(loopback_for(bound), bound);
    }

    #[test]
    fn display_name_from_flag_or_settings() {
        let mut settings = LinecastSettings::default();
        assert!(display_name(None, &settings).is_err());
        assert_eq!(display_name(Some(" ann ".into()), &settings).unwrap(), "ann");
        settings.client.name = Some("ben".into());
        assert_eq!(display_name(None, &settings).unwrap(), "ben");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli =
            Cli::try_parse_from(["linecast", "serve", "--port", "6000", "--admin-port", "9100"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Serve {
                port: Some(6000),
                admin_port: Some(9100),
                ..
            }
        ));

        let args = ["linecast", "--log-level", "debug", "join", "--name", "x", "10.0.0.1"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert!(matches!(cli.command, Command::Join { ref addr, .. } if addr == "10.0.0.1"));
    }

    #[test]
    fn unknown_log_level_rejected() {
        assert!(Cli::try_parse_from(["linecast", "--log-level", "loud", "serve"]).is_err());
    }

    #[test]
    fn console_modes_default_to_quiet_logging() {
        let cli = Cli::try_parse_from(["linecast", "host", "--name", "x"]).unwrap();
        let mut settings = LinecastSettings::default();
        apply_logging_flags(&mut settings, &cli);
        assert_eq!(settings.logging.level, LogLevel::Warn);

        let cli = Cli::try_parse_from(["linecast", "serve", "--log-json"]).unwrap();
        let mut settings = LinecastSettings::default();
        apply_logging_flags(&mut settings, &cli);
        assert_eq!(settings.logging.level, LogLevel::Info);
        assert!(settings.logging.json);
    }

    #[test]
    fn settings_file_feeds_server_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 6100, "echoToSender": false}}"#).unwrap();
        let settings = linecast_settings::load_settings_from_path(&path)
            .unwrap()
            .settings;
        let config = ServerConfig::from_settings(&settings);
        assert_eq!(config.port, 6100);
        assert!(!config.echo_to_sender);
    }
}
