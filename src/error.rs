//! Error types returned by the event queue.
//!
//! The usage errors ([`Error::AlreadyWatched`], [`Error::UnknownToken`],
//! [`Error::ForeignDescriptor`] and [`Error::InvalidMask`]) leave the queue
//! untouched. Every other variant carries the OS error that caused it and
//! is not locally recoverable: a host that receives one from
//! [`EventQueue::run`](crate::EventQueue::run) is expected to tear the
//! scheduling thread down.

use crate::reactor::{Mask, Token};

use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The multiplexer control operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    /// `EPOLL_CTL_ADD`, issued by `watch`.
    Add,
    /// `EPOLL_CTL_MOD`, issued by `adjust`.
    Modify,
    /// `EPOLL_CTL_DEL`, issued by `forget`.
    Delete,
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlOp::Add => "add",
            ControlOp::Modify => "modify",
            ControlOp::Delete => "delete",
        };

        f.write_str(name)
    }
}

/// Errors produced by [`EventQueue`](crate::EventQueue).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The multiplexer handle could not be created.
    #[error("failed to create the multiplexer: {0}")]
    Create(#[source] io::Error),

    /// A registration call on the multiplexer failed.
    #[error("multiplexer {op} failed for fd {fd}: {source}")]
    Control {
        op: ControlOp,
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// The descriptor already has a live registration in this queue.
    #[error("fd {0} is already watched")]
    AlreadyWatched(RawFd),

    /// The token does not name a live registration.
    #[error("token {0:?} does not name a live registration")]
    UnknownToken(Token),

    /// The descriptor handed to `forget_owned` is not the one registered
    /// under the token. The descriptor is returned unclosed.
    #[error("fd {} does not belong to registration {token:?}", .fd.as_raw_fd())]
    ForeignDescriptor { token: Token, fd: OwnedFd },

    /// The requested mask is empty or contains report-only bits.
    #[error("mask {0:?} cannot be requested")]
    InvalidMask(Mask),

    /// The wait call failed with something other than `EINTR`.
    #[error("waiting on the multiplexer failed: {0}")]
    Wait(#[source] io::Error),

    /// Closing the multiplexer handle failed.
    #[error("failed to close the multiplexer: {0}")]
    Close(#[source] io::Error),
}
