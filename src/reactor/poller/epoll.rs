//! Linux `epoll`-based multiplexer.
//!
//! Responsibilities:
//! - Own exactly one `epoll` instance
//! - Add, modify and remove descriptor registrations
//! - Block waiting for readiness with no timeout
//!
//! The instance is created close-on-exec so it does not leak into child
//! processes spawned by the scheduling thread.

use super::Multiplexer;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, c_int, epoll_create1, epoll_ctl,
    epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::{AsRawFd, RawFd};

/// Linux `epoll` multiplexer.
///
/// The descriptor is closed by [`Multiplexer::close`]. If the value is
/// dropped without being closed, the descriptor is closed silently.
#[derive(Debug)]
pub struct Epoll {
    /// Epoll file descriptor, `-1` once closed.
    epoll: RawFd,
}

impl Epoll {
    /// Creates a new `epoll` instance.
    pub fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self { epoll })
    }

    fn ctl(&self, op: c_int, fd: RawFd, interest: u32, data: u64) -> io::Result<()> {
        let mut event = epoll_event {
            events: interest,
            u64: data,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.epoll
    }
}

impl Multiplexer for Epoll {
    fn add(&mut self, fd: RawFd, interest: u32, data: u64) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, interest, data)
    }

    fn modify(&mut self, fd: RawFd, interest: u32, data: u64) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, interest, data)
    }

    fn delete(&mut self, fd: RawFd) -> io::Result<()> {
        // Kernels before 2.6.9 require a non-null event even for removal.
        let mut event = epoll_event { events: 0, u64: 0 };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn wait(&mut self, batch: &mut [epoll_event]) -> io::Result<usize> {
        let capacity = batch.len().min(c_int::MAX as usize) as c_int;

        let n = unsafe { epoll_wait(self.epoll, batch.as_mut_ptr(), capacity, -1) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(n as usize)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.epoll < 0 {
            return Ok(());
        }

        let fd = std::mem::replace(&mut self.epoll, -1);

        let rc = unsafe { libc::close(fd) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        if self.epoll >= 0 {
            unsafe { libc::close(self.epoll) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_is_idempotent() {
        let mut epoll = Epoll::new().unwrap();
        assert!(epoll.as_raw_fd() >= 0);

        epoll.close().unwrap();
        assert_eq!(epoll.as_raw_fd(), -1);
        epoll.close().unwrap();
    }

    #[test]
    fn delete_of_unknown_fd_is_enoent() {
        let mut epoll = Epoll::new().unwrap();
        let fds = {
            let mut fds = [0; 2];
            assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
            fds
        };

        let error = epoll.delete(fds[0]).unwrap_err();
        assert_eq!(error.raw_os_error(), Some(libc::ENOENT));

        unsafe {
            libc::close(fds[0]);
            libc::close(fds[1]);
        }
    }
}
