//! An embeddable network service toolkit: a pluggable readiness-driven
//! event loop (select/poll/epoll), blocking TCP/UDP/TLS transport, an
//! HTTP/1.1 request/response engine (client, server, forward proxy), and
//! a WebSocket layer on top of the HTTP upgrade handshake.
//!
//! Everything here is built around non-blocking sockets multiplexed by a
//! pluggable event loop and a fixed worker pool, rather than an async
//! runtime: the event loop tracks the listener *and* every accepted
//! connection, dispatching a bounded unit of work to the pool each time a
//! descriptor becomes readable and re-arming it only once that work
//! finishes — so an idle connection never occupies a worker thread.
//! Logging, error types, and configuration follow the rest of this
//! crate's house style — see [`logging`] and [`error`].

pub mod error;
pub mod eventloop;
pub mod http;
pub mod logging;
pub mod pool;
pub mod remote;
pub mod server;
pub mod transport;

#[cfg(feature = "ws")]
pub mod ws;

pub use error::{NetError, Result};
pub use server::{ConnStream, ReadOutcome, Server, ServerConfig, ServerState};
