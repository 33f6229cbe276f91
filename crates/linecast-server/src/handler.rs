//! Per-connection read loop and lifecycle.
//!
//! Each accepted connection gets two tasks: the handler below, which owns the
//! read half and publishes every complete line, and a writer task
//! ([`run_writer`]) that owns the write half. The handler is generic over the
//! transport so in-memory pipes can stand in for sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use linecast_core::{ConnectionId, Line};
use linecast_telemetry::metrics::{DISCONNECTIONS_TOTAL, LINES_RECEIVED_TOTAL};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::connection::{Connection, DisconnectReason, run_writer};
use crate::registry::{ConnectionRegistry, Registration};

/// Per-connection tunables, derived from [`ServerConfig`].
#[derive(Clone, Debug)]
pub struct HandlerOptions {
    /// Line that disconnects its sender without being broadcast.
    pub disconnect_sentinel: Option<String>,
    /// Read deadline; `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Outbound queue capacity.
    pub outbound_buffer: usize,
    /// Longest accepted inbound line, in bytes.
    pub max_line_length: usize,
    /// Deadline for writing one line.
    pub write_timeout: Duration,
}

impl HandlerOptions {
    /// Derive options from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            disconnect_sentinel: config.disconnect_sentinel.clone(),
            idle_timeout: config.idle_timeout(),
            outbound_buffer: config.outbound_buffer.max(1),
            max_line_length: config.max_line_length,
            write_timeout: config.write_timeout(),
        }
    }
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Shared state every connection task needs.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Live membership.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out over `registry`.
    pub broadcaster: Arc<Broadcaster>,
    /// Per-connection tunables.
    pub options: Arc<HandlerOptions>,
    /// Server-wide shutdown; each connection runs under a child token.
    pub shutdown: CancellationToken,
    /// Tracks connection tasks so shutdown can wait for them.
    pub tracker: TaskTracker,
}

/// Register a new connection and start its reader and writer tasks.
///
/// The connection is a registry member before this returns, so every line
/// published afterwards is offered to it.
pub fn spawn_connection<R, W>(
    read: R,
    write: W,
    peer_addr: SocketAddr,
    ctx: &ConnectionContext,
) -> Arc<Connection>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(ctx.options.outbound_buffer);
    let connection = Arc::new(Connection::new(
        ConnectionId::new(),
        peer_addr,
        tx,
        ctx.shutdown.child_token(),
    ));
    let span = info_span!("connection", conn_id = %connection.id(), peer = %peer_addr);

    let registration = ctx.registry.register(Arc::clone(&connection));
    let writer = ctx.tracker.spawn(
        run_writer(
            Arc::clone(&connection),
            FramedWrite::new(write, LinesCodec::new()),
            rx,
            ctx.options.write_timeout,
        )
        .instrument(span.clone()),
    );

    let handler = ConnectionHandler {
        connection: Arc::clone(&connection),
        registration,
        broadcaster: Arc::clone(&ctx.broadcaster),
        options: Arc::clone(&ctx.options),
    };
    let _ = ctx.tracker.spawn(handler.run(read, writer).instrument(span));
    connection
}

/// Reads lines from one peer and publishes them.
pub struct ConnectionHandler {
    connection: Arc<Connection>,
    registration: Registration,
    broadcaster: Arc<Broadcaster>,
    options: Arc<HandlerOptions>,
}

enum ReadOutcome {
    Line(String),
    Eof,
    Fault(LinesCodecError),
    Idle,
}

impl ConnectionHandler {
    /// Run until the peer leaves, a read fails, or the connection is
    /// terminated; then tear the connection down and return why it ended.
    pub async fn run<R>(self, read: R, writer: JoinHandle<()>) -> DisconnectReason
    where
        R: AsyncRead + Unpin,
    {
        let Self {
            connection,
            registration,
            broadcaster,
            options,
        } = self;
        debug!("connection open");

        let mut lines = FramedRead::new(
            read,
            LinesCodec::new_with_max_length(options.max_line_length),
        );

        let reason = loop {
            let outcome = tokio::select! {
                biased;
                () = connection.cancelled() => {
                    break connection.disconnect_reason().unwrap_or(DisconnectReason::Shutdown);
                }
                outcome = next_line(&mut lines, options.idle_timeout) => outcome,
            };
            match outcome {
                ReadOutcome::Line(text) => {
                    if options.disconnect_sentinel.as_deref() == Some(text.as_str()) {
                        break DisconnectReason::Sentinel;
                    }
                    metrics::counter!(LINES_RECEIVED_TOTAL).increment(1);
                    let _ = broadcaster.publish(&Line::new(text), Some(connection.id()));
                }
                ReadOutcome::Eof => break DisconnectReason::PeerClosed,
                ReadOutcome::Idle => break DisconnectReason::IdleTimeout,
                ReadOutcome::Fault(LinesCodecError::MaxLineLengthExceeded) => {
                    break DisconnectReason::LineTooLong;
                }
                ReadOutcome::Fault(LinesCodecError::Io(error)) => {
                    debug!(%error, "read failed");
                    break DisconnectReason::ReadFault;
                }
            }
        };

        // Leave the registry first so no later broadcast targets this peer.
        drop(registration);
        drop(lines);
        connection.mark_read_closed();
        connection.terminate(reason);
        let reason = connection.disconnect_reason().unwrap_or(reason);

        if let Err(error) = writer.await {
            warn!(%error, "writer task failed");
        }

        metrics::counter!(DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
        info!(
            reason = %reason,
            lines_queued = connection.lines_queued(),
            age_ms = u64::try_from(connection.age().as_millis()).unwrap_or(u64::MAX),
            "connection closed"
        );
        reason
    }
}

async fn next_line<R>(
    lines: &mut FramedRead<R, LinesCodec>,
    idle_timeout: Option<Duration>,
) -> ReadOutcome
where
    R: AsyncRead + Unpin,
{
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, lines.next()).await {
            Ok(next) => next,
            Err(_) => return ReadOutcome::Idle,
        },
        None => lines.next().await,
    };
    match next {
        Some(Ok(text)) => ReadOutcome::Line(text),
        Some(Err(error)) => ReadOutcome::Fault(error),
        None => ReadOutcome::Eof,
    }
}
