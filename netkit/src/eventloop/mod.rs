//! Pluggable readiness-driven event dispatch (spec §4.1).
//!
//! Three interchangeable backends sit behind one [`EventLoop`] trait:
//! [`select`] and [`poll`] (level-triggered), and [`epoll`] (edge-triggered,
//! Linux only). All three are grounded directly on the original
//! `net::SelectEventLoop` / `PollEventLoop` / `EpollEventLoop`
//! (`original_source/net/common/include/event_loop.hpp`): same fd-keyed
//! event table, same dispatch-order tie-break (READ before ERROR).

mod epoll;
mod poll;
mod select;

use std::os::unix::io::RawFd;
use std::time::Duration;

pub use epoll::EpollEventLoop;
pub use poll::PollEventLoop;
pub use select::SelectEventLoop;

use crate::error::Result;

/// A tiny hand-rolled bitflags substitute, scoped to this module's needs
/// (four fixed bits; no reason to pull in the `bitflags` crate for that).
macro_rules! bitflags_like_mask {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($ty);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const fn empty() -> Self {
                $name(0)
            }

            pub const fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn intersects(&self, other: Self) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

/// Which concrete backend to drive a [`crate::server::Server`] with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLoopKind {
    /// Level-triggered `select(2)`. Bounded by the platform's fd-set size;
    /// retained only for environments lacking `epoll`.
    Select,
    /// Level-triggered `poll(2)`. No fixed descriptor ceiling.
    Poll,
    /// Edge-triggered `epoll(7)`. Readable notifications fire once per
    /// state transition: the `on_read` callback must fully drain the
    /// socket, since more bytes arriving will not re-notify until the
    /// socket empties and refills (spec §4.1, §9 "edge-triggered drain").
    Epoll,
}

bitflags_like_mask! {
    /// Bitset over which callbacks are registered for a descriptor,
    /// derived automatically from the non-empty fields of an
    /// [`EventHandler`] (spec §3 "Event").
    pub struct EventMask: u8 {
        const READ  = 0b0001;
        const WRITE = 0b0010;
        const ERROR = 0b0100;
        const HUP   = 0b1000;
    }
}

/// A capability bundle of optional per-descriptor callbacks (spec §9:
/// "Implementers should represent this as a small record of function
/// pointers, not as an inheritance hierarchy").
#[derive(Clone, Default)]
pub struct EventHandler {
    pub on_read: Option<std::sync::Arc<dyn Fn(RawFd) + Send + Sync>>,
    pub on_write: Option<std::sync::Arc<dyn Fn(RawFd) + Send + Sync>>,
    pub on_error: Option<std::sync::Arc<dyn Fn(RawFd) + Send + Sync>>,
}

impl EventHandler {
    pub fn mask(&self) -> EventMask {
        let mut m = EventMask::empty();
        if self.on_read.is_some() {
            m |= EventMask::READ;
        }
        if self.on_write.is_some() {
            m |= EventMask::WRITE;
        }
        if self.on_error.is_some() {
            m |= EventMask::ERROR | EventMask::HUP;
        }
        m
    }

    /// Dispatches in the tie-break order spec §4.3 requires: READ, then
    /// ERROR (WRITE has no ordering constraint relative to the other two
    /// and is dispatched between them, matching the original's
    /// `Event::on_trigger`).
    pub fn dispatch(&self, fd: RawFd, ready: EventMask) {
        if ready.contains(EventMask::READ) {
            if let Some(cb) = &self.on_read {
                cb(fd);
            }
        }
        if ready.contains(EventMask::WRITE) {
            if let Some(cb) = &self.on_write {
                cb(fd);
            }
        }
        if ready.intersects(EventMask::ERROR | EventMask::HUP) {
            if let Some(cb) = &self.on_error {
                cb(fd);
            }
        }
    }
}

/// Common interface implemented by every backend.
pub trait EventLoop: Send {
    /// Registers `fd` with interest derived from `handler`'s non-empty
    /// callbacks. Must accept a descriptor that was previously removed.
    fn add_event(&mut self, fd: RawFd, handler: EventHandler) -> Result<()>;

    /// Unregisters `fd`. Safe to call on a descriptor that was never
    /// registered (or already removed): a no-op, never an error.
    fn remove_event(&mut self, fd: RawFd);

    /// Blocks up to `timeout`, dispatching ready descriptors' callbacks.
    /// Returns the number of descriptors dispatched (0 on timeout).
    /// Fails only on an unrecoverable syscall error; per-descriptor errors
    /// go through `on_error`, never through this return value.
    fn wait_for_events(&mut self, timeout: Duration) -> Result<usize>;
}

/// Constructs the requested backend behind a boxed trait object.
pub fn new_event_loop(kind: EventLoopKind) -> Result<Box<dyn EventLoop>> {
    Ok(match kind {
        EventLoopKind::Select => Box::new(SelectEventLoop::new()),
        EventLoopKind::Poll => Box::new(PollEventLoop::new()),
        EventLoopKind::Epoll => Box::new(EpollEventLoop::new()?),
    })
}
