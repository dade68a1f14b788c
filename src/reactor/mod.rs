//! Readiness queue core.
//!
//! This module implements the per-thread event queue. The queue is
//! responsible for:
//! - translating between readiness masks and kernel bits,
//! - keeping registrations consistent between the kernel and its registry,
//! - dispatching each fetched batch to callbacks, honouring changes made
//!   while the batch is being dispatched.
//!
//! The queue never spawns threads and never blocks anywhere but in the
//! multiplexer's wait call.

mod callback;
mod core;
mod mask;
mod notify;
mod token;

pub(crate) mod poller;

pub use callback::{EventCallback, SchedulerHost};
pub use self::core::EventQueue;
pub use mask::{Mask, from_kernel, to_kernel};
pub use notify::Notifier;
pub use poller::{Epoll, LabMultiplexer, Multiplexer};
pub use token::Token;
