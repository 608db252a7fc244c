//! The single error type returned across every public API boundary.
//!
//! Library-level code returns this `thiserror` enum directly; an embedding
//! binary's `main` is free to wrap it in `anyhow::Error` at the application
//! edge instead of threading `anyhow` through library code.

use std::io;

/// Errors produced by the transport, event loop, HTTP, and WebSocket layers.
#[derive(thiserror::Error, Debug)]
pub enum NetError {
    /// Endpoint resolution failed (bad host/port, no usable address record).
    #[error("failed to resolve endpoint {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// A `connect`/`bind`/`listen`/`accept` syscall failed.
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// The peer closed its end of the connection (zero-byte read or write).
    #[error("peer closed the connection")]
    PeerClosed,

    /// TLS handshake, certificate, or session error.
    #[error("tls error: {0}")]
    Tls(String),

    /// Malformed HTTP on the wire (bad request line, missing Host, etc.).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The WebSocket upgrade handshake did not complete.
    #[error("websocket upgrade failed: {0}")]
    WebSocketUpgrade(String),

    /// `WorkerPool::submit` was called after `WorkerPool::shutdown`.
    #[error("worker pool is stopped")]
    PoolStopped,

    /// Server/transport configuration was invalid for the current state.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl NetError {
    pub(crate) fn io(op: &'static str, source: io::Error) -> Self {
        NetError::Io { op, source }
    }
}

impl From<NetError> for io::Error {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Io { source, .. } => source,
            NetError::Resolve { source, .. } => source,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
