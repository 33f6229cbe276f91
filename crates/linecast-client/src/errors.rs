//! Client error types.

use std::time::Duration;

use linecast_core::LineError;
use thiserror::Error;

/// Errors from connecting to or talking with a linecast server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connection could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled.
        addr: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// The server did not accept within the connect timeout.
    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout {
        /// Address that was dialled.
        addr: String,
        /// Configured deadline.
        timeout: Duration,
    },
    /// The outbound text would split into several lines on the wire.
    #[error("invalid line: {0}")]
    InvalidLine(#[from] LineError),
    /// The connection is closed; nothing more can be sent.
    #[error("connection closed")]
    Closed,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_line_from_line_error() {
        let err: ClientError = LineError::EmbeddedTerminator.into();
        assert!(matches!(err, ClientError::InvalidLine(_)));
        assert!(err.to_string().contains("terminator"));
    }

    #[test]
    fn connect_timeout_display() {
        let err = ClientError::ConnectTimeout {
            addr: "10.0.0.1:5000".into(),
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.to_string(), "timed out connecting to 10.0.0.1:5000 after 3s");
    }
}
