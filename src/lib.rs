//! # readyq
//!
//! **readyq** is a per-thread I/O readiness event queue for cooperative,
//! thread-confined schedulers. It turns Linux `epoll` edge-triggered
//! notifications into synchronous callback dispatch.
//!
//! Each scheduling thread owns one [`EventQueue`]. Resources are registered
//! with [`EventQueue::watch`], re-masked with [`EventQueue::adjust`] and
//! removed with [`EventQueue::forget`]. [`EventQueue::run`] blocks in the
//! kernel, dispatches every ready entry to its [`EventCallback`] in kernel
//! order, then hands control to the [`SchedulerHost`] through its `pump`
//! hook.
//!
//! Callbacks receive the queue itself and may change any registration
//! while a batch is being dispatched. Entries fetched for a registration
//! that is forgotten later in the same batch are never delivered, and
//! entries for a registration that is adjusted are narrowed to the new
//! mask.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use readyq::{EventQueue, Mask, SchedulerHost};
//! use std::os::fd::AsRawFd;
//!
//! struct Host {
//!     turns: usize,
//! }
//!
//! impl SchedulerHost for Host {
//!     fn should_shut_down(&mut self) -> bool {
//!         self.turns == 10
//!     }
//!
//!     fn pump(&mut self, _queue: &mut EventQueue) {
//!         self.turns += 1;
//!     }
//! }
//!
//! let mut queue = EventQueue::new()?;
//! let (reader, _writer) = std::os::unix::net::UnixStream::pair()?;
//! reader.set_nonblocking(true)?;
//!
//! queue.watch(reader.as_raw_fd(), Mask::READABLE, |_: &mut EventQueue, mask: Mask| {
//!     println!("ready: {mask:?}");
//! })?;
//!
//! queue.run(&mut Host { turns: 0 })?;
//! ```
//!
//! ## Modules
//!
//! - [`EventQueue`] — registration and the wait/dispatch loop
//! - [`Mask`] — readiness masks and their kernel translation
//! - [`Notifier`] — an `eventfd` wake resource for hosts
//! - [`LabMultiplexer`] — a scripted multiplexer for deterministic tests

mod builder;
mod error;
mod reactor;
mod utils;

pub use builder::EventQueueBuilder;
pub use error::{ControlOp, Error, Result};
pub use reactor::{
    Epoll, EventCallback, EventQueue, LabMultiplexer, Mask, Multiplexer, Notifier,
    SchedulerHost, Token, from_kernel, to_kernel,
};

#[cfg(not(target_os = "linux"))]
compile_error!("readyq requires Linux epoll");
