//! OS multiplexer abstraction.
//!
//! The queue talks to the kernel through the [`Multiplexer`] trait so the
//! dispatch logic can be driven either by the real Linux `epoll` facility
//! ([`Epoll`]) or by a scripted, in-memory stand-in ([`LabMultiplexer`]) in
//! tests.
//!
//! Batch entries use the kernel's own `epoll_event` layout regardless of
//! backend: `events` holds the reported kernel bits and `u64` holds the
//! registration's user data.

mod epoll;
mod lab;

pub use epoll::Epoll;
pub use lab::LabMultiplexer;

use libc::epoll_event;
use std::io;
use std::os::fd::RawFd;

/// A readiness multiplexer owning one kernel-side handle.
///
/// `interest` arguments are raw kernel bits, already including the
/// edge-triggered flag. `data` is opaque to the multiplexer and must be
/// echoed back unchanged in every batch entry reported for `fd`.
pub trait Multiplexer {
    /// Creates the registration for `fd`. Fails with `EEXIST` if one exists.
    fn add(&mut self, fd: RawFd, interest: u32, data: u64) -> io::Result<()>;

    /// Replaces the registration for `fd`. Fails with `ENOENT` if none exists.
    fn modify(&mut self, fd: RawFd, interest: u32, data: u64) -> io::Result<()>;

    /// Removes the registration for `fd`. Fails with `ENOENT` if none exists.
    fn delete(&mut self, fd: RawFd) -> io::Result<()>;

    /// Blocks until at least one registration is ready, then fills the front
    /// of `batch` and returns how many entries were written.
    ///
    /// An interrupted wait is reported as [`io::ErrorKind::Interrupted`].
    fn wait(&mut self, batch: &mut [epoll_event]) -> io::Result<usize>;

    /// Releases the kernel handle. Called exactly once by the owning queue.
    fn close(&mut self) -> io::Result<()>;
}
