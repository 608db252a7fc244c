//! Per-connection lifecycle and the pool that tracks all of them (spec
//! §4.3 "RemoteTarget/RemotePool"). Grounded on
//! `original_source/net/common/include/remote_target.hpp`, whose
//! destructor closes the descriptor exactly once no matter how many times
//! `close()` is called directly versus via drop.
//!
//! The actual socket descriptor is owned by the `TcpStream`/`ConnStream`
//! the connection handler reads and writes through — not by
//! `RemoteTarget` itself, to avoid two owners racing to `close(2)` the
//! same fd. `RemoteTarget::close` instead issues `shutdown(2)`, which
//! forcibly unblocks any in-progress read/write on that descriptor from
//! another thread without taking ownership of it; the idempotency
//! guarantee (via `Drop` plus an atomic guard) is about not calling
//! `shutdown` twice, not about the fd's lifetime.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// One live (or just-closed) peer connection, keyed by its raw descriptor.
///
/// Closing is idempotent and race-free: `close()` and the `Drop` impl both
/// go through the same guarded path, so whichever happens first actually
/// closes the fd and the other becomes a no-op.
pub struct RemoteTarget {
    fd: RawFd,
    peer: SocketAddr,
    active: AtomicBool,
    close_guard: Mutex<()>,
}

impl RemoteTarget {
    pub fn new(fd: RawFd, peer: SocketAddr) -> Self {
        Self {
            fd,
            peer,
            active: AtomicBool::new(true),
            close_guard: Mutex::new(()),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn peer_ip(&self) -> std::net::IpAddr {
        self.peer.ip()
    }

    pub fn peer_port(&self) -> u16 {
        self.peer.port()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Forcibly terminates the connection. Safe to call more than once,
    /// and safe to race against the `Drop` impl: only the first caller
    /// actually issues `shutdown(2)`. The descriptor itself is closed
    /// later, when the owning stream is dropped.
    pub fn close(&self) {
        let _guard = self.close_guard.lock();
        if self.active.swap(false, Ordering::AcqRel) {
            unsafe {
                libc::shutdown(self.fd, libc::SHUT_RDWR);
            }
        }
    }
}

impl Drop for RemoteTarget {
    fn drop(&mut self) {
        self.close();
    }
}

/// A registry of live [`RemoteTarget`]s keyed by descriptor, guarded by a
/// single mutex — matching the original's `RemotePool`, which favors one
/// coarse lock over per-bucket locking since inserts/removals/iteration are
/// already rare relative to per-connection I/O.
#[derive(Default)]
pub struct RemotePool {
    targets: Mutex<HashMap<RawFd, Arc<RemoteTarget>>>,
}

impl RemotePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, target: Arc<RemoteTarget>) {
        self.targets.lock().insert(target.fd(), target);
    }

    /// Removes and closes the target for `fd`, if present.
    pub fn remove(&self, fd: RawFd) -> Option<Arc<RemoteTarget>> {
        let removed = self.targets.lock().remove(&fd);
        if let Some(target) = &removed {
            target.close();
        }
        removed
    }

    pub fn get(&self, fd: RawFd) -> Option<Arc<RemoteTarget>> {
        self.targets.lock().get(&fd).cloned()
    }

    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.lock().is_empty()
    }

    /// Runs `f` over every currently-registered target. Takes a snapshot
    /// under the lock first so `f` can itself call back into `remove`/
    /// `insert` without deadlocking.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<RemoteTarget>)) {
        let snapshot: Vec<Arc<RemoteTarget>> = self.targets.lock().values().cloned().collect();
        for target in &snapshot {
            f(target);
        }
    }

    /// Closes and removes every target. Used on server shutdown.
    pub fn clear(&self) {
        let drained: Vec<Arc<RemoteTarget>> = self.targets.lock().drain().map(|(_, v)| v).collect();
        for target in drained {
            target.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn dup_stdin_fd() -> RawFd {
        // Any valid, owned-by-us descriptor works for exercising the
        // close-once guarantee without touching real network state.
        unsafe { libc::dup(0) }
    }

    #[test]
    fn close_is_idempotent_across_direct_call_and_drop() {
        let fd = dup_stdin_fd();
        let target = RemoteTarget::new(fd, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000));
        assert!(target.is_active());
        target.close();
        assert!(!target.is_active());
        target.close(); // second call must not double-close the fd
        drop(target); // drop must not re-close it either
    }

    #[test]
    fn pool_remove_closes_and_forgets_the_target() {
        let pool = RemotePool::new();
        let fd = dup_stdin_fd();
        let target = Arc::new(RemoteTarget::new(fd, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9001)));
        pool.insert(target.clone());
        assert_eq!(pool.len(), 1);

        let removed = pool.remove(fd).unwrap();
        assert!(!removed.is_active());
        assert!(pool.get(fd).is_none());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn for_each_visits_every_registered_target() {
        let pool = RemotePool::new();
        for i in 0..3 {
            let fd = dup_stdin_fd();
            pool.insert(Arc::new(RemoteTarget::new(
                fd,
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9100 + i),
            )));
        }
        let mut seen = 0;
        pool.for_each(|_| seen += 1);
        assert_eq!(seen, 3);
        pool.clear();
        assert!(pool.is_empty());
    }
}
