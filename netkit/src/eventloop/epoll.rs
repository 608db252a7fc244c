//! `epoll(7)` backend, edge-triggered (`EPOLLET`). Linux only.
//!
//! Grounded on `original_source/net/common/include/event_loop.hpp`'s
//! `EpollEventLoop`, which owns one epoll fd for the lifetime of the loop
//! and relies on `epoll_ctl` to add/remove individual watches rather than
//! rebuilding a set on every wait, unlike [`super::select`]/[`super::poll`].

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::{NetError, Result};

use super::{EventHandler, EventLoop, EventMask};

pub struct EpollEventLoop {
    epoll_fd: RawFd,
    handlers: HashMap<RawFd, EventHandler>,
}

impl EpollEventLoop {
    pub fn new() -> Result<Self> {
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(NetError::io("epoll_create1", std::io::Error::last_os_error()));
        }
        Ok(Self {
            epoll_fd,
            handlers: HashMap::new(),
        })
    }

    fn epoll_events_for(mask: EventMask) -> u32 {
        let mut events = libc::EPOLLET as u32;
        if mask.intersects(EventMask::READ) {
            events |= libc::EPOLLIN as u32;
        }
        if mask.intersects(EventMask::WRITE) {
            events |= libc::EPOLLOUT as u32;
        }
        events
    }
}

impl Drop for EpollEventLoop {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}

impl EventLoop for EpollEventLoop {
    fn add_event(&mut self, fd: RawFd, handler: EventHandler) -> Result<()> {
        let op = if self.handlers.contains_key(&fd) {
            libc::EPOLL_CTL_MOD
        } else {
            libc::EPOLL_CTL_ADD
        };
        let mut ev = libc::epoll_event {
            events: Self::epoll_events_for(handler.mask()),
            u64: fd as u64,
        };
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut ev) };
        if rc < 0 {
            return Err(NetError::io("epoll_ctl", std::io::Error::last_os_error()));
        }
        self.handlers.insert(fd, handler);
        Ok(())
    }

    fn remove_event(&mut self, fd: RawFd) {
        if self.handlers.remove(&fd).is_some() {
            unsafe {
                // Pre-2.6.9 kernels require a non-null event pointer even for
                // EPOLL_CTL_DEL; pass a zeroed one for portability.
                let mut ev: libc::epoll_event = std::mem::zeroed();
                libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, &mut ev);
            }
        }
    }

    fn wait_for_events(&mut self, timeout: Duration) -> Result<usize> {
        const MAX_EVENTS: usize = 256;
        let mut events: [libc::epoll_event; MAX_EVENTS] = unsafe { std::mem::zeroed() };
        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let n = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                events.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(NetError::io("epoll_wait", err));
        }

        let mut dispatched = 0;
        for ev in &events[..n as usize] {
            let fd = ev.u64 as RawFd;
            let mut ready_mask = EventMask::empty();
            if ev.events & libc::EPOLLIN as u32 != 0 {
                ready_mask |= EventMask::READ;
            }
            if ev.events & libc::EPOLLOUT as u32 != 0 {
                ready_mask |= EventMask::WRITE;
            }
            if ev.events & libc::EPOLLERR as u32 != 0 {
                ready_mask |= EventMask::ERROR;
            }
            if ev.events & libc::EPOLLHUP as u32 != 0 {
                ready_mask |= EventMask::HUP;
            }
            if let Some(handler) = self.handlers.get(&fd) {
                handler.dispatch(fd, ready_mask);
            }
            dispatched += 1;
        }

        Ok(dispatched)
    }
}
