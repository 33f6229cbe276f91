//! # linecast-core
//!
//! Value types shared by the linecast server and client:
//!
//! - **`Line`**: the immutable unit of transmission, cheap to share across
//!   every recipient of a broadcast
//! - **`ConnectionId`**: opaque identity of one accepted connection

#![deny(unsafe_code)]

pub mod ids;
pub mod line;

pub use ids::ConnectionId;
pub use line::{Line, LineError};
