//! `poll(2)` backend. Level-triggered, no `FD_SETSIZE` ceiling.
//!
//! Grounded on `original_source/net/common/include/event_loop.hpp`'s
//! `PollEventLoop`, which keeps a persistent `pollfd` vector indexed
//! alongside the handler table.

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::error::{NetError, Result};

use super::{EventHandler, EventLoop, EventMask};

pub struct PollEventLoop {
    handlers: HashMap<RawFd, EventHandler>,
}

impl PollEventLoop {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    fn poll_events_for(mask: EventMask) -> libc::c_short {
        let mut events = 0;
        if mask.intersects(EventMask::READ) {
            events |= libc::POLLIN;
        }
        if mask.intersects(EventMask::WRITE) {
            events |= libc::POLLOUT;
        }
        events as libc::c_short
    }
}

impl Default for PollEventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for PollEventLoop {
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

        let fds: Vec<RawFd> = self.handlers.keys().copied().collect();
        let mut pollfds: Vec<libc::pollfd> = fds
            .iter()
            .map(|&fd| libc::pollfd {
                fd,
                events: Self::poll_events_for(self.handlers[&fd].mask()),
                revents: 0,
            })
            .collect();

        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        let ready = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(NetError::io("poll", err));
        }
        if ready == 0 {
            return Ok(0);
        }

        let mut dispatched = 0;
        for pfd in &pollfds {
            if pfd.revents == 0 {
                continue;
            }
            let mut ready_mask = EventMask::empty();
            if pfd.revents & libc::POLLIN != 0 {
                ready_mask |= EventMask::READ;
            }
            if pfd.revents & libc::POLLOUT != 0 {
                ready_mask |= EventMask::WRITE;
            }
            if pfd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                ready_mask |= EventMask::ERROR;
            }
            if pfd.revents & libc::POLLHUP != 0 {
                ready_mask |= EventMask::HUP;
            }
            if let Some(handler) = self.handlers.get(&pfd.fd) {
                handler.dispatch(pfd.fd, ready_mask);
            }
            dispatched += 1;
        }

        Ok(dispatched)
    }
}
