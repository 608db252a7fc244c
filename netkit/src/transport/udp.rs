//! Connectionless UDP transport, grounded on
//! `original_source/net/socket/include/socket_base.hpp`'s `UdpSocket`
//! (bind-then-`recvfrom`/`sendto`, no listen/accept phase).

use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};

use socket2::{Domain, Protocol, Socket, Type};

use crate::error::{NetError, Result};

use super::resolve_endpoint;

pub struct UdpTransport {
    socket: Socket,
    local: SocketAddr,
}

impl UdpTransport {
    pub fn bind(endpoint: &str) -> Result<Self> {
        let local = resolve_endpoint(endpoint)?;
        let domain = if local.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| NetError::io("socket", e))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| NetError::io("setsockopt(SO_REUSEADDR)", e))?;
        socket.bind(&local.into()).map_err(|e| NetError::io("bind", e))?;
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

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Receives one datagram, translating `WouldBlock` into `Ok(None)`.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        let uninit = unsafe {
            &mut *(buf as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
        };
        match self.socket.recv_from(uninit) {
            Ok((n, addr)) => Ok(Some((n, addr.as_socket().unwrap_or(self.local)))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(NetError::io("recvfrom", e)),
        }
    }

    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        self.socket
            .send_to(buf, &target.into())
            .map_err(|e| NetError::io("sendto", e))
    }
}

impl AsRawFd for UdpTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}
