//! Per-peer connection state and the writer task.
//!
//! A [`Connection`] is shared: the registry and the broadcaster hold it by
//! `Arc` to enqueue lines, while the read half of the socket is owned solely by
//! the connection's handler. Socket writes happen only in [`run_writer`],
//! which drains the bounded outbound queue.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::SinkExt;
use linecast_core::{ConnectionId, Line};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedWrite, LinesCodec, LinesCodecError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;

/// State of one direction of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfState {
    /// Still usable.
    Open,
    /// Torn down.
    Closed,
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed its side (EOF).
    PeerClosed,
    /// A network error or invalid UTF-8 on read.
    ReadFault,
    /// The peer sent a line longer than the configured limit.
    LineTooLong,
    /// No line arrived within the read deadline.
    IdleTimeout,
    /// The peer sent the configured disconnect sentinel.
    Sentinel,
    /// Writing to the peer failed or timed out.
    WriteFault,
    /// The peer's outbound queue overflowed.
    SlowConsumer,
    /// The server is shutting down.
    Shutdown,
}

impl DisconnectReason {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::ReadFault => "read_fault",
            Self::LineTooLong => "line_too_long",
            Self::IdleTimeout => "idle_timeout",
            Self::Sentinel => "sentinel",
            Self::WriteFault => "write_fault",
            Self::SlowConsumer => "slow_consumer",
            Self::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to enqueue a line for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The outbound queue is at capacity.
    #[error("outbound queue full")]
    Full,
    /// The writer has stopped accepting lines.
    #[error("connection closed")]
    Closed,
}

/// One accepted peer.
pub struct Connection {
    id: ConnectionId,
    peer_addr: SocketAddr,
    /// Queue drained by the writer task.
    tx: mpsc::Sender<Line>,
    /// Cancelled when the connection must end, from any side.
    cancel: CancellationToken,
    /// First reason recorded by [`Connection::terminate`].
    reason: Mutex<Option<DisconnectReason>>,
    read_open: AtomicBool,
    write_open: AtomicBool,
    connected_at: Instant,
    lines_queued: AtomicU64,
}

impl Connection {
    /// Create a connection around the sending side of its outbound queue.
    pub fn new(
        id: ConnectionId,
        peer_addr: SocketAddr,
        tx: mpsc::Sender<Line>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer_addr,
            tx,
            cancel,
            reason: Mutex::new(None),
            read_open: AtomicBool::new(true),
            write_open: AtomicBool::new(true),
            connected_at: Instant::now(),
            lines_queued: AtomicU64::new(0),
        }
    }

    /// Opaque identity.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Remote address (informational only).
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Time since accept.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Enqueue a line for the writer without blocking.
    pub fn send(&self, line: Line) -> Result<(), SendError> {
        match self.tx.try_send(line) {
            Ok(()) => {
                let _ = self.lines_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(SendError::Full),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Total lines accepted into the outbound queue.
    pub fn lines_queued(&self) -> u64 {
        self.lines_queued.load(Ordering::Relaxed)
    }

    /// Ask the connection to end. The first recorded reason wins.
    pub fn terminate(&self, reason: DisconnectReason) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.cancel.cancel();
    }

    /// Whether the connection has been asked to end.
    pub fn is_terminating(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection has been asked to end.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Reason recorded by [`Connection::terminate`], if any.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.reason.lock()
    }

    /// State of the inbound direction.
    pub fn read_state(&self) -> HalfState {
        half_state(&self.read_open)
    }

    /// State of the outbound direction.
    pub fn write_state(&self) -> HalfState {
        half_state(&self.write_open)
    }

    pub(crate) fn mark_read_closed(&self) {
        self.read_open.store(false, Ordering::Release);
    }

    pub(crate) fn mark_write_closed(&self) {
        self.write_open.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("read", &self.read_state())
            .field("write", &self.write_state())
            .finish_non_exhaustive()
    }
}

fn half_state(flag: &AtomicBool) -> HalfState {
    if flag.load(Ordering::Acquire) {
        HalfState::Open
    } else {
        HalfState::Closed
    }
}

/// Drain the outbound queue into the socket until the connection ends.
///
/// A failed or timed-out write terminates the connection with
/// [`DisconnectReason::WriteFault`], which the handler observes on its next
/// read. An evicted slow consumer is dropped without further writes. On any
/// other termination, lines already queued are flushed (bounded by
/// `write_timeout`) before the write side is shut down.
pub async fn run_writer<W>(
    connection: Arc<Connection>,
    mut sink: FramedWrite<W, LinesCodec>,
    mut rx: mpsc::Receiver<Line>,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = connection.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(line) = next else { break };
        // A cancelled write leaves the encoded line in the sink's buffer.
        let written = tokio::select! {
            biased;
            () = connection.cancelled() => break,
            written = write_line(&mut sink, line, write_timeout) => written,
        };
        if let Err(error) = written {
            debug!(conn_id = %connection.id(), %error, "write failed");
            connection.terminate(DisconnectReason::WriteFault);
            rx.close();
            connection.mark_write_closed();
            return;
        }
    }

    rx.close();
    if connection.disconnect_reason() == Some(DisconnectReason::SlowConsumer) {
        connection.mark_write_closed();
        return;
    }

    // Flush whatever was queued before termination.
    let flush = async {
        while let Some(line) = rx.recv().await {
            sink.send(line).await?;
        }
        SinkExt::<Line>::close(&mut sink).await
    };
    match tokio::time::timeout(write_timeout, flush).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => debug!(conn_id = %connection.id(), %error, "flush on close failed"),
        Err(_) => debug!(conn_id = %connection.id(), "flush on close timed out"),
    }
    connection.mark_write_closed();
}

#[derive(Debug, Error)]
enum WriteError {
    #[error(transparent)]
    Codec(#[from] LinesCodecError),
    #[error("write timed out after {0:?}")]
    TimedOut(Duration),
}

async fn write_line<W>(
    sink: &mut FramedWrite<W, LinesCodec>,
    line: Line,
    write_timeout: Duration,
) -> Result<(), WriteError>
where
    W: AsyncWrite + Unpin,
{
    tokio::time::timeout(write_timeout, sink.send(line))
        .await
        .map_err(|_| WriteError::TimedOut(write_timeout))??;
    Ok(())
}
