//! Server error types.
//!
//! Only listener-scoped failures surface as errors; connection-scoped faults
//! end that connection and are reported through [`DisconnectReason`].
//!
//! [`DisconnectReason`]: crate::connection::DisconnectReason

use thiserror::Error;

/// Errors that are visible to the process running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening endpoint could not be acquired.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// Any other I/O failure at listener scope.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
