//! `select(2)` backend. Level-triggered: a socket with unread bytes keeps
//! reporting readable on every call until drained.
//!
//! Grounded on `original_source/net/common/include/event_loop.hpp`'s
//! `SelectEventLoop`, which rebuilds its fd_sets from the registered table
//! on every wait rather than keeping them persistently mutated.

use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::{NetError, Result};

use super::{EventHandler, EventLoop, EventMask};

pub struct SelectEventLoop {
    handlers: HashMap<RawFd, EventHandler>,
}

impl SelectEventLoop {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl Default for SelectEventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for SelectEventLoop {
    fn add_event(&mut self, fd: RawFd, handler: EventHandler) -> Result<()> {
        self.handlers.insert(fd, handler);
        Ok(())
    }

    fn remove_event(&mut self, fd: RawFd) {
        self.handlers.remove(&fd);
    }

    fn wait_for_events(&mut self, timeout: Duration) -> Result<usize> {
        if self.handlers.is_empty() {
            std::thread::sleep(timeout.min(Duration::from_millis(50)));
            return Ok(0);
        }

        // select(2) only tolerates descriptors below FD_SETSIZE; anything
        // larger simply can't be watched by this backend (the caller should
        // have picked poll/epoll for high-fd workloads).
        let watched: Vec<RawFd> = self
            .handlers
            .keys()
            .filter(|fd| **fd < libc::FD_SETSIZE as RawFd)
            .copied()
            .collect();

        let mut read_set = unsafe {
            let mut s = MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(s.as_mut_ptr());
            s.assume_init()
        };
        let mut write_set = unsafe {
            let mut s = MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(s.as_mut_ptr());
            s.assume_init()
        };
        let mut error_set = unsafe {
            let mut s = MaybeUninit::<libc::fd_set>::uninit();
            libc::FD_ZERO(s.as_mut_ptr());
            s.assume_init()
        };

        let mut max_fd: RawFd = -1;
        for &fd in &watched {
            let mask = self.handlers[&fd].mask();
            unsafe {
                if mask.intersects(EventMask::READ) {
                    libc::FD_SET(fd, &mut read_set);
                }
                if mask.intersects(EventMask::WRITE) {
                    libc::FD_SET(fd, &mut write_set);
                }
                if mask.intersects(EventMask::ERROR | EventMask::HUP) {
                    libc::FD_SET(fd, &mut error_set);
                }
            }
            max_fd = max_fd.max(fd);
        }

        if max_fd < 0 {
            std::thread::sleep(timeout.min(Duration::from_millis(50)));
            return Ok(0);
        }

        let mut tv = libc::timeval {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_usec: timeout.subsec_micros() as libc::suseconds_t,
        };

        let ready = unsafe {
            libc::select(
                max_fd + 1,
                &mut read_set,
                &mut write_set,
                &mut error_set,
                &mut tv,
            )
        };

        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(NetError::io("select", err));
        }
        if ready == 0 {
            return Ok(0);
        }

        let mut dispatched = 0;
        for &fd in &watched {
            let mut ready_mask = EventMask::empty();
            unsafe {
                if libc::FD_ISSET(fd, &read_set) {
                    ready_mask |= EventMask::READ;
                }
                if libc::FD_ISSET(fd, &write_set) {
                    ready_mask |= EventMask::WRITE;
                }
                if libc::FD_ISSET(fd, &error_set) {
                    ready_mask |= EventMask::ERROR;
                }
            }
            if ready_mask.intersects(EventMask::READ | EventMask::WRITE | EventMask::ERROR) {
                if let Some(handler) = self.handlers.get(&fd) {
                    handler.dispatch(fd, ready_mask);
                }
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }
}
