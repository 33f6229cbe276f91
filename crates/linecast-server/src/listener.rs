//! TCP accept loop.

use std::net::SocketAddr;
use std::time::Duration;

use linecast_telemetry::metrics::{
    ACCEPT_ERRORS_TOTAL, CONNECTIONS_REJECTED_TOTAL, CONNECTIONS_TOTAL,
};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::errors::{Result, ServerError};
use crate::handler::{ConnectionContext, spawn_connection};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and hands each one to its own handler.
pub struct Listener {
    listener: TcpListener,
    ctx: ConnectionContext,
    max_connections: usize,
}

impl Listener {
    /// Bind `addr`. Failure here is the only fatal server error.
    pub async fn bind(addr: &str, ctx: ConnectionContext, max_connections: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self {
            listener,
            ctx,
            max_connections,
        })
    }

    /// Address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until the shutdown token is cancelled.
    ///
    /// Per-accept failures are logged and survived; they never end the loop.
    pub async fn run(self) {
        let shutdown = self.ctx.shutdown.clone();
        loop {
            let accepted = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer_addr)) => self.admit(stream, peer_addr),
                Err(error) => {
                    warn!(%error, "accept failed");
                    metrics::counter!(ACCEPT_ERRORS_TOTAL).increment(1);
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                    }
                }
            }
        }
        info!("listener stopped accepting");
    }

    fn admit(&self, stream: TcpStream, peer_addr: SocketAddr) {
        if self.ctx.registry.len() >= self.max_connections {
            warn!(
                peer = %peer_addr,
                max_connections = self.max_connections,
                "connection limit reached, rejecting"
            );
            metrics::counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
            return;
        }
        if let Err(error) = stream.set_nodelay(true) {
            debug!(peer = %peer_addr, %error, "failed to set TCP_NODELAY");
        }
        metrics::counter!(CONNECTIONS_TOTAL).increment(1);

        let (read, write) = stream.into_split();
        let connection = spawn_connection(read, write, peer_addr, &self.ctx);
        info!(
            conn_id = %connection.id(),
            peer = %peer_addr,
            active = self.ctx.registry.len(),
            "connection accepted"
        );
    }
}
