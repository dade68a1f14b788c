//! Wake resource for event loop hosts.
//!
//! A [`Notifier`] wraps an `eventfd`. The host watches it for
//! [`Mask::READABLE`](crate::Mask::READABLE) on its queue; any thread can
//! then call [`notify`](Notifier::notify) to make a blocked wait return,
//! which bounds how long a shutdown request can go unnoticed.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// An `eventfd`-backed wake signal.
#[derive(Debug)]
pub struct Notifier {
    fd: OwnedFd,
}

impl Notifier {
    /// Creates a non-blocking, close-on-exec `eventfd` with a zero counter.
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Makes the descriptor readable.
    ///
    /// A counter that is already saturated counts as notified.
    pub fn notify(&self) -> io::Result<()> {
        let buf: u64 = 1;

        let n = unsafe { libc::write(self.fd.as_raw_fd(), &buf as *const u64 as *const _, 8) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(());
            }
            return Err(err);
        }

        Ok(())
    }

    /// Resets the counter and returns how many notifications it held.
    ///
    /// Returns `0` if there was nothing to drain. Because registrations are
    /// edge-triggered, a host must drain from its callback before the next
    /// notification can be reported.
    pub fn drain(&self) -> io::Result<u64> {
        let mut buf: u64 = 0;

        let n = unsafe { libc::read(self.fd.as_raw_fd(), &mut buf as *mut u64 as *mut _, 8) };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }

        Ok(buf)
    }
}

impl AsRawFd for Notifier {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Notifier {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifications_accumulate_until_drained() {
        let notifier = Notifier::new().unwrap();

        assert_eq!(notifier.drain().unwrap(), 0);

        notifier.notify().unwrap();
        notifier.notify().unwrap();

        assert_eq!(notifier.drain().unwrap(), 2);
        assert_eq!(notifier.drain().unwrap(), 0);
    }
}
