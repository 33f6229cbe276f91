//! `LinecastServer`: the line broadcast server and its admin endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::info;

use crate::admin::{self, AdminState};
use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::handler::{ConnectionContext, HandlerOptions};
use crate::listener::Listener;
use crate::registry::ConnectionRegistry;
use crate::shutdown::ShutdownCoordinator;

/// The linecast server.
pub struct LinecastServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    shutdown: Arc<ShutdownCoordinator>,
    tracker: TaskTracker,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl LinecastServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), config.echo_to_sender));
        Self {
            config,
            registry,
            broadcaster,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            tracker: TaskTracker::new(),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Attach a Prometheus handle so `/metrics` can render it.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn connection_context(&self) -> ConnectionContext {
        ConnectionContext {
            registry: self.registry.clone(),
            broadcaster: self.broadcaster.clone(),
            options: Arc::new(HandlerOptions::from_config(&self.config)),
            shutdown: self.shutdown.token(),
            tracker: self.tracker.clone(),
        }
    }

    /// Bind the line listener and start accepting in the background.
    ///
    /// Returns the bound address (useful with port `0`) and the accept-loop
    /// handle, which completes after shutdown begins.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let bind_addr = self.config.bind_addr();
        let listener = Listener::bind(
            &bind_addr,
            self.connection_context(),
            self.config.max_connections,
        )
        .await?;
        let addr = listener.local_addr()?;
        info!(%addr, "linecast server listening");
        Ok((addr, tokio::spawn(listener.run())))
    }

    /// Bind and serve the admin endpoint, if an admin port is configured.
    pub async fn listen_admin(&self) -> Result<Option<(SocketAddr, JoinHandle<()>)>> {
        let Some(admin_addr) = self.config.admin_addr() else {
            return Ok(None);
        };
        let listener = TcpListener::bind(&admin_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: admin_addr.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        info!(%addr, "admin endpoint listening");
        let handle = tokio::spawn(admin::serve(
            listener,
            self.admin_router(),
            self.shutdown.token(),
        ));
        Ok(Some((addr, handle)))
    }

    /// Build the admin router (`/health`, `/metrics`).
    pub fn admin_router(&self) -> axum::Router {
        admin::router(AdminState {
            broadcaster: self.broadcaster.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        })
    }

    /// Stop accepting, end every connection, and wait for them to close.
    ///
    /// Returns `false` if some connections outlived the shutdown timeout.
    pub async fn shutdown_gracefully(&self) -> bool {
        info!(active = self.registry.len(), "shutting down");
        self.shutdown
            .graceful_shutdown(&self.tracker, Some(self.config.shutdown_timeout()))
            .await
    }

    /// Live connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Line fan-out.
    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linecast_core::Line;

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn server_with_default_config() {
        let server = LinecastServer::new(ServerConfig::default());
        assert_eq!(server.config().port, 5000);
        assert!(server.registry().is_empty());
        assert!(!server.shutdown().is_shutting_down());
    }

    #[test]
    fn echo_setting_reaches_broadcaster() {
        let config = ServerConfig {
            echo_to_sender: false,
            ..local_config()
        };
        let server = LinecastServer::new(config);
        assert!(!server.broadcaster().echo_to_sender());
    }

    #[tokio::test]
    async fn listen_on_ephemeral_port() {
        let server = LinecastServer::new(local_config());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.shutdown_gracefully().await);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn admin_disabled_without_port() {
        let server = LinecastServer::new(local_config());
        assert!(server.listen_admin().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn admin_listens_when_configured() {
        let config = ServerConfig {
            admin_port: Some(0),
            ..local_config()
        };
        let server = LinecastServer::new(config);
        let (addr, handle) = server.listen_admin().await.unwrap().unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn publish_without_clients_counts_line() {
        let server = LinecastServer::new(local_config());
        let report = server.broadcaster().publish(&Line::from("hi"), None);
        assert_eq!(report.recipients, 0);
        assert_eq!(server.broadcaster().lines_published(), 1);
    }
}
