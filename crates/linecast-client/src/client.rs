//! Line client: a send function plus an inbound channel.
//!
//! [`LineClient::connect`] splits the socket between two background tasks. The
//! reader forwards every inbound line to [`Inbound`]; the writer drains
//! lines queued by [`LineClient::send_line`]. Closing the client shuts down
//! the write side, which the server sees as EOF.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use linecast_core::Line;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{ClientError, Result};

/// Client tunables.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Deadline for the TCP connect.
    pub connect_timeout: Duration,
    /// Lines that may wait in each direction before backpressure applies.
    pub buffer: usize,
    /// Longest accepted inbound line, in bytes.
    pub max_line_length: usize,
    /// How long [`LineClient::close`] waits for queued lines to be written.
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            buffer: 256,
            max_line_length: 64 * 1024,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Sending side of a connection to a linecast server.
pub struct LineClient {
    outbound: mpsc::Sender<Line>,
    writer: JoinHandle<()>,
    reader_cancel: CancellationToken,
    close_timeout: Duration,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

/// Lines received from the server, in arrival order.
pub struct Inbound {
    rx: mpsc::Receiver<Line>,
}

impl Inbound {
    /// Next line, or `None` once the server has closed the connection.
    pub async fn recv(&mut self) -> Option<Line> {
        self.rx.recv().await
    }

    /// Next line if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Line> {
        self.rx.try_recv().ok()
    }
}

impl LineClient {
    /// Connect to `addr` and start the reader and writer tasks.
    pub async fn connect<A>(addr: A, config: &ClientConfig) -> Result<(Self, Inbound)>
    where
        A: ToSocketAddrs + std::fmt::Display,
    {
        let connecting = TcpStream::connect(&addr);
        let stream = match tokio::time::timeout(config.connect_timeout, connecting).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ClientError::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(ClientError::ConnectTimeout {
                    addr: addr.to_string(),
                    timeout: config.connect_timeout,
                });
            }
        };
        if let Err(error) = stream.set_nodelay(true) {
            debug!(%error, "failed to set TCP_NODELAY");
        }
        let connect_err = |source| ClientError::Connect {
            addr: addr.to_string(),
            source,
        };
        let local_addr = stream.local_addr().map_err(connect_err)?;
        let peer_addr = stream.peer_addr().map_err(connect_err)?;
        let (read, write) = stream.into_split();

        let buffer = config.buffer.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(buffer);
        let reader_cancel = CancellationToken::new();

        let _ = tokio::spawn(read_loop(
            FramedRead::new(read, LinesCodec::new_with_max_length(config.max_line_length)),
            inbound_tx,
            reader_cancel.clone(),
        ));
        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write, LinesCodec::new()),
            outbound_rx,
        ));
        debug!(%local_addr, %peer_addr, "connected");

        Ok((
            Self {
                outbound: outbound_tx,
                writer,
                reader_cancel,
                close_timeout: config.close_timeout,
                local_addr,
                peer_addr,
            },
            Inbound { rx: inbound_rx },
        ))
    }

    /// Queue one line for sending.
    ///
    /// Fails with [`ClientError::InvalidLine`] if `text` contains a line
    /// terminator, and with [`ClientError::Closed`] once the connection is gone.
    pub async fn send_line(&self, text: impl Into<Arc<str>>) -> Result<()> {
        let line = Line::checked(text)?;
        self.outbound
            .send(line)
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Server address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Whether the writer has stopped (server gone or write failed).
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Flush queued lines, shut down the write side and stop reading.
    ///
    /// Waits at most `close_timeout` for the flush; a peer that stopped
    /// reading gets its connection aborted instead.
    pub async fn close(self) {
        let Self {
            outbound,
            mut writer,
            reader_cancel,
            close_timeout,
            ..
        } = self;
        drop(outbound);
        match tokio::time::timeout(close_timeout, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => debug!(%error, "writer task failed"),
            Err(_) => {
                debug!(?close_timeout, "flush on close timed out");
                writer.abort();
            }
        }
        reader_cancel.cancel();
    }
}

async fn read_loop(
    mut lines: FramedRead<OwnedReadHalf, LinesCodec>,
    inbound: mpsc::Sender<Line>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = lines.next() => next,
        };
        match next {
            Some(Ok(text)) => {
                if inbound.send(Line::new(text)).await.is_err() {
                    break;
                }
            }
            Some(Err(error)) => {
                debug!(%error, "read failed");
                break;
            }
            None => break,
        }
    }
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, LinesCodec>,
    mut outbound: mpsc::Receiver<Line>,
) {
    while let Some(line) = outbound.recv().await {
        if let Err(error) = sink.send(line).await {
            debug!(%error, "write failed");
            outbound.close();
            return;
        }
    }
    if let Err(error) = SinkExt::<Line>::close(&mut sink).await {
        debug!(%error, "shutdown failed");
    }
}
