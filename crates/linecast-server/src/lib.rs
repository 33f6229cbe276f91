//! # linecast-server
//!
//! TCP line broadcast server. Every newline-terminated line a client sends is
//! relayed to every connected client.
//!
//! - `listener`: accept loop, admission cap, per-connection task spawning
//! - `handler`: per-connection read loop and ordered teardown
//! - `registry`: the live connection set (the only shared mutable state)
//! - `broadcast`: non-blocking fan-out of one line to every member
//! - `connection`: per-peer state, outbound queue and writer task
//! - `shutdown`: graceful shutdown via `CancellationToken` + `TaskTracker`
//! - `admin`: optional `/health` and `/metrics` HTTP endpoint

#![deny(unsafe_code)]

pub mod admin;
pub mod broadcast;
pub mod config;
pub mod connection;
pub mod errors;
pub mod handler;
pub mod health;
pub mod listener;
pub mod registry;
pub mod server;
pub mod shutdown;

pub use broadcast::{Broadcaster, PublishReport};
pub use config::ServerConfig;
pub use connection::{Connection, DisconnectReason, HalfState, SendError};
pub use errors::{Result, ServerError};
pub use handler::{ConnectionContext, ConnectionHandler, HandlerOptions, spawn_connection};
pub use listener::Listener;
pub use registry::{ConnectionRegistry, Registration};
pub use server::LinecastServer;
pub use shutdown::ShutdownCoordinator;
