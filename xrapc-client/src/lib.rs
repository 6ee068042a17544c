//! # xrapc-client
//!
//! Client library for XRAP servers.
//!
//! This crate provides:
//! - A thread-safe client multiplexing many requests over one socket
//! - Blocking sends with a timeout, and futures for deferred replies
//! - A ZeroMQ DEALER transport and an in-memory transport pair
//! - Layered configuration (defaults, YAML file, environment)
//!
//! The API is blocking. Inside an async runtime, call it through
//! `spawn_blocking`.
//!
//! Request IDs are 32-bit and wrap around, skipping 0. A connection reuses
//! an ID only after about four billion requests; a reply still outstanding
//! that long would be confused with the new request's.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod future;
pub mod transport;
pub mod zmq;

pub use client::Client;
pub use config::{default_endpoint, ClientConfig};
pub use connection::{Connection, DEFAULT_TIMEOUT};
pub use error::{ClientError, ConfigError, TransportError};
pub use future::ReplyFuture;
pub use transport::{memory_transport_pair, MemoryTransport, MessageTransport};
pub use zmq::ZmqTransport;
