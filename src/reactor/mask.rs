//! Readiness masks and their translation to `epoll` bits.
//!
//! The public vocabulary is deliberately smaller than what the kernel
//! understands. Three bits may be requested (`READABLE`, `WRITABLE`,
//! `REMOTE_HANGUP`); two more (`ERROR`, `HANGUP`) are only ever reported.

use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP};

bitflags::bitflags! {
    /// A set of readiness conditions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mask: u8 {
        /// Data can be read (`EPOLLIN`).
        const READABLE = 0b0000_0001;
        /// Data can be written (`EPOLLOUT`).
        const WRITABLE = 0b0000_0010;
        /// The peer shut down its writing half (`EPOLLRDHUP`).
        const REMOTE_HANGUP = 0b0000_0100;
        /// An error condition is pending (`EPOLLERR`). Report only.
        const ERROR = 0b0000_1000;
        /// The descriptor hung up (`EPOLLHUP`). Report only.
        const HANGUP = 0b0001_0000;

        /// Bits a caller may pass to `watch` or `adjust`.
        const REQUESTABLE = Self::READABLE.bits()
            | Self::WRITABLE.bits()
            | Self::REMOTE_HANGUP.bits();

        /// Bits the kernel reports whether or not they were requested.
        const REPORT_ONLY = Self::ERROR.bits() | Self::HANGUP.bits();
    }
}

impl Mask {
    /// Translates a requestable mask into kernel interest bits.
    ///
    /// The edge-triggered flag is not included; the queue adds it itself.
    /// Report-only bits are a caller error and are rejected by the queue
    /// before they get here.
    pub fn to_kernel(self) -> u32 {
        debug_assert!(
            Mask::REQUESTABLE.contains(self),
            "mask {self:?} contains report-only bits"
        );

        let mut bits = 0;

        if self.contains(Mask::READABLE) {
            bits |= EPOLLIN as u32;
        }
        if self.contains(Mask::WRITABLE) {
            bits |= EPOLLOUT as u32;
        }
        if self.contains(Mask::REMOTE_HANGUP) {
            bits |= EPOLLRDHUP as u32;
        }

        bits
    }

    /// Translates reported kernel bits into a mask.
    ///
    /// Unknown kernel bits (such as `EPOLLET` echoed back) are dropped.
    pub fn from_kernel(bits: u32) -> Mask {
        let mut mask = Mask::empty();

        if bits & EPOLLIN as u32 != 0 {
            mask |= Mask::READABLE;
        }
        if bits & EPOLLOUT as u32 != 0 {
            mask |= Mask::WRITABLE;
        }
        if bits & EPOLLRDHUP as u32 != 0 {
            mask |= Mask::REMOTE_HANGUP;
        }
        if bits & EPOLLERR as u32 != 0 {
            mask |= Mask::ERROR;
        }
        if bits & EPOLLHUP as u32 != 0 {
            mask |= Mask::HANGUP;
        }

        mask
    }

    /// Returns `true` if the mask may be passed to `watch` or `adjust`.
    pub fn is_requestable(self) -> bool {
        !self.is_empty() && Mask::REQUESTABLE.contains(self)
    }
}

/// Free-function form of [`Mask::to_kernel`].
pub fn to_kernel(mask: Mask) -> u32 {
    mask.to_kernel()
}

/// Free-function form of [`Mask::from_kernel`].
pub fn from_kernel(bits: u32) -> Mask {
    Mask::from_kernel(bits)
}
