//! Transport layer: endpoint resolution plus TCP/UDP/TLS connection setup
//! (spec §4.2). Everything here hands back a blocking `std::net`/`socket2`
//! socket or stream; the event loop and server runtime own non-blocking
//! multiplexing on top.

mod tcp;
mod udp;

#[cfg(feature = "tls")]
mod tls;

pub use tcp::{TcpClient, TcpServer};
pub use udp::UdpTransport;

#[cfg(feature = "tls")]
pub use tls::{TlsClient, TlsContext, TlsServer, TlsStream};

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{NetError, Result};

/// Resolves a `host:port` (or any string accepted by `ToSocketAddrs`) into
/// a concrete socket address, taking the first candidate — grounded on
/// `original_source/net/socket/include/socket_base.hpp`'s `resolve_endpoint`,
/// which likewise just takes `getaddrinfo`'s first result.
pub fn resolve_endpoint(endpoint: &str) -> Result<SocketAddr> {
    endpoint
        .to_socket_addrs()
        .map_err(|source| NetError::Resolve {
            endpoint: endpoint.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| NetError::Resolve {
            endpoint: endpoint.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no address records",
            ),
        })
}

/// Coarse connection lifecycle shared by TCP, TLS, and the server runtime
/// (spec §3 "TransportStatus").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Disconnected,
    Listening,
    Connected,
}
