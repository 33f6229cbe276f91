//! # linecast-client
//!
//! Client side of the linecast wire protocol: one TCP connection, lines out
//! through [`LineClient::send_line`], lines in through [`Inbound::recv`].
//! Also carries the chat-style formatting and local-address helpers used by
//! the console client.

#![deny(unsafe_code)]

pub mod client;
pub mod discovery;
pub mod errors;
pub mod format;

pub use client::{ClientConfig, Inbound, LineClient};
pub use discovery::local_ipv4;
pub use errors::{ClientError, Result};
pub use format::SenderPrefix;
