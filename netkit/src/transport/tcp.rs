//! Blocking TCP client/server setup built on `socket2`, grounded on
//! `original_source/net/socket/include/socket_base.hpp`'s `TcpServer`
//! (`SO_REUSEADDR` + `listen` before handing off to the event loop) and
//! `TcpClient` (`connect` with an explicit resolve step first).

use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{NetError, Result};

use super::resolve_endpoint;

/// A connected TCP stream plus the peer address it was resolved from.
pub struct TcpClient {
    stream: TcpStream,
    peer: std::net::SocketAddr,
}

impl TcpClient {
    /// Resolves `endpoint` and connects, applying `TCP_NODELAY` the way the
    /// original's `TcpClient::connect` does to keep small HTTP request/
    /// response writes from coalescing under Nagle's algorithm.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let peer = resolve_endpoint(endpoint)?;
        let domain = if peer.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| NetError::io("socket", e))?;
        socket
            .connect(&peer.into())
            .map_err(|e| NetError::io("connect", e))?;
        socket.set_nodelay(true).map_err(|e| NetError::io("setsockopt(TCP_NODELAY)", e))?;
        Ok(Self {
            stream: socket.into(),
            peer,
        })
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    pub fn peer_addr(&self) -> std::net::SocketAddr {
        self.peer
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.stream
            .set_nonblocking(nonblocking)
            .map_err(|e| NetError::io("set_nonblocking", e))
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream
            .set_read_timeout(timeout)
            .map_err(|e| NetError::io("set_read_timeout", e))
    }
}

impl AsRawFd for TcpClient {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// A listening TCP socket ready to be registered with an event loop for
/// `accept` readiness, or polled directly with blocking `accept`.
pub struct TcpServer {
    socket: Socket,
    local: std::net::SocketAddr,
}

impl TcpServer {
    /// Binds and listens on `endpoint` with `SO_REUSEADDR` set before bind,
    /// matching the original's `TcpServer::listen` (reuse lets a restarted
    /// server rebind immediately instead of hitting `TIME_WAIT`).
    pub fn listen(endpoint: &str, backlog: i32) -> Result<Self> {
        let local = resolve_endpoint(endpoint)?;
        let domain = if local.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| NetError::io("socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| NetError::io("setsockopt(SO_REUSEADDR)", e))?;
        socket.bind(&local.into()).map_err(|e| NetError::io("bind", e))?;
        socket.listen(backlog).map_err(|e| NetError::io("listen", e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| NetError::io("set_nonblocking", e))?;
        let local = socket
            .local_addr()
            .ok()
            .and_then(|a| a.as_socket())
            .unwrap_or(local);
        Ok(Self { socket, local })
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local
    }

    /// Accepts one pending connection, translating `WouldBlock` into `Ok(None)`
    /// so callers driven by the event loop can treat it as "not ready yet"
    /// rather than an error.
    pub fn accept(&self) -> Result<Option<TcpClient>> {
        match self.socket.accept() {
            Ok((sock, addr)) => {
                let stream: TcpStream = sock.into();
                stream
                    .set_nodelay(true)
                    .map_err(|e| NetError::io("setsockopt(TCP_NODELAY)", e))?;
                let peer = addr.as_socket().unwrap_or(self.local);
                Ok(Some(TcpClient { stream, peer }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(NetError::io("accept", e)),
        }
    }
}

impl AsRawFd for TcpServer {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
