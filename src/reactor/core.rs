use super::callback::{EventCallback, SchedulerHost};
use super::mask::Mask;
use super::poller::{Epoll, Multiplexer};
use super::token::Token;
use crate::builder::EventQueueBuilder;
use crate::error::{ControlOp, Error, Result};
use crate::utils::Slab;

use libc::{EPOLLET, epoll_event};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, trace, warn};

/// A live association between a descriptor, a mask and a callback.
struct Registration<M: Multiplexer> {
    fd: RawFd,
    mask: Mask,
    /// `None` while the callback is being dispatched.
    callback: Option<Box<dyn EventCallback<M>>>,
}

/// A per-thread, edge-triggered readiness queue.
///
/// The queue owns one multiplexer handle and a fixed-capacity batch buffer.
/// Each call to [`turn`](Self::turn) blocks until the kernel reports ready
/// registrations and then invokes their callbacks synchronously, in the
/// order the kernel returned them.
///
/// Callbacks may call [`watch`](Self::watch), [`adjust`](Self::adjust) and
/// [`forget`](Self::forget) while a batch is being dispatched:
/// - entries of the current batch that belong to a forgotten registration
///   are skipped,
/// - entries that belong to an adjusted registration are narrowed to the
///   new mask.
///
/// # Forget before close
///
/// The queue does not own the descriptors it watches. An owner must call
/// [`forget`](Self::forget) (or hand the descriptor to
/// [`forget_owned`](Self::forget_owned)) before closing a watched
/// descriptor. Closing first makes the kernel drop the registration
/// silently while entries already fetched into the current batch, and the
/// queue's own record of the registration, stay behind.
///
/// # Threading
///
/// A queue is confined to the thread that created it and takes no locks.
/// Run one queue per scheduling thread.
pub struct EventQueue<M: Multiplexer = Epoll> {
    multiplexer: M,

    registry: Slab<Registration<M>>,
    by_fd: HashMap<RawFd, Token>,

    /// Batch buffer, sized once to the configured capacity.
    batch: Vec<epoll_event>,
    /// Number of entries fetched by the last wait.
    fetched: usize,
    /// Index of the next entry to dispatch.
    cursor: usize,
    dispatching: bool,

    closed: bool,

    /// Last requested mask per descriptor, checked against reports.
    #[cfg(debug_assertions)]
    requested: HashMap<RawFd, Mask>,
}

impl EventQueue<Epoll> {
    /// Creates a queue backed by a new `epoll` instance, with default
    /// settings.
    pub fn new() -> Result<Self> {
        EventQueueBuilder::new().build()
    }
}

impl<M: Multiplexer> EventQueue<M> {
    pub(crate) fn from_parts(
        multiplexer: M,
        batch_capacity: usize,
        registry_capacity: usize,
    ) -> Self {
        debug!(batch_capacity, registry_capacity, "event queue created");

        Self {
            multiplexer,
            registry: Slab::with_capacity(registry_capacity),
            by_fd: HashMap::with_capacity(registry_capacity),
            batch: vec![epoll_event { events: 0, u64: 0 }; batch_capacity],
            fetched: 0,
            cursor: 0,
            dispatching: false,
            closed: false,
            #[cfg(debug_assertions)]
            requested: HashMap::with_capacity(registry_capacity),
        }
    }

    /// Starts watching `fd` for the readiness conditions in `mask`.
    ///
    /// The registration is edge-triggered: `callback` is told about a
    /// transition once and the owner must fully service the descriptor
    /// before it is told again.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMask`] if `mask` is empty or contains report-only bits.
    /// - [`Error::AlreadyWatched`] if this queue already watches `fd`.
    /// - [`Error::Control`] if the kernel rejects the registration.
    pub fn watch<C>(&mut self, fd: RawFd, mask: Mask, callback: C) -> Result<Token>
    where
        C: EventCallback<M> + 'static,
    {
        if !mask.is_requestable() {
            return Err(Error::InvalidMask(mask));
        }

        if self.by_fd.contains_key(&fd) {
            return Err(Error::AlreadyWatched(fd));
        }

        let token = self.registry.insert(Registration {
            fd,
            mask,
            callback: Some(Box::new(callback)),
        });

        if let Err(source) = self.multiplexer.add(fd, interest(mask), token.pack()) {
            self.registry.remove(token);

            error!(fd, ?mask, %source, "failed to watch descriptor");
            return Err(Error::Control {
                op: ControlOp::Add,
                fd,
                source,
            });
        }

        self.by_fd.insert(fd, token);

        #[cfg(debug_assertions)]
        self.requested.insert(fd, mask);

        debug!(fd, ?token, ?mask, "watching descriptor");
        Ok(token)
    }

    /// Replaces the mask of a live registration.
    ///
    /// Entries of the batch being dispatched that have not been delivered
    /// yet are narrowed to `mask`; an entry left with nothing to report is
    /// skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMask`] if `mask` is empty or contains report-only bits.
    /// - [`Error::UnknownToken`] if `token` is not live.
    /// - [`Error::Control`] if the kernel rejects the change.
    pub fn adjust(&mut self, token: Token, mask: Mask) -> Result<()> {
        if !mask.is_requestable() {
            return Err(Error::InvalidMask(mask));
        }

        let registration = self
            .registry
            .get_mut(token)
            .ok_or(Error::UnknownToken(token))?;
        let fd = registration.fd;

        if let Err(source) = self.multiplexer.modify(fd, interest(mask), token.pack()) {
            error!(fd, ?token, ?mask, %source, "failed to adjust registration");
            return Err(Error::Control {
                op: ControlOp::Modify,
                fd,
                source,
            });
        }

        registration.mask = mask;

        #[cfg(debug_assertions)]
        self.requested.insert(fd, mask);

        let allowed = mask.to_kernel();
        let narrowed = self.for_each_pending(token, |entry| {
            entry.events = entry.events & allowed;
        });

        debug!(fd, ?token, ?mask, narrowed, "adjusted registration");
        Ok(())
    }

    /// Removes a live registration.
    ///
    /// Entries of the batch being dispatched that have not been delivered
    /// yet are cancelled. If a callback forgets its own registration, the
    /// callback is dropped once it returns.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownToken`] if `token` is not live.
    /// - [`Error::Control`] if the kernel rejects the removal. The
    ///   registration is kept in that case.
    pub fn forget(&mut self, token: Token) -> Result<()> {
        let fd = self
            .registry
            .get(token)
            .map(|registration| registration.fd)
            .ok_or(Error::UnknownToken(token))?;

        if let Err(source) = self.multiplexer.delete(fd) {
            error!(fd, ?token, %source, "failed to forget registration");
            return Err(Error::Control {
                op: ControlOp::Delete,
                fd,
                source,
            });
        }

        self.registry.remove(token);
        self.by_fd.remove(&fd);

        #[cfg(debug_assertions)]
        self.requested.remove(&fd);

        let cancelled = self.for_each_pending(token, |entry| {
            entry.events = 0;
            entry.u64 = Token::CANCELLED;
        });

        debug!(fd, ?token, cancelled, "forgot registration");
        Ok(())
    }

    /// Forgets the registration and then closes the descriptor.
    ///
    /// Taking ownership of the descriptor guarantees the registration is
    /// gone before the descriptor number can be reused. Once the pairing is
    /// confirmed the descriptor is closed even if forgetting fails.
    ///
    /// # Errors
    ///
    /// - [`Error::ForeignDescriptor`] if `token` does not name a live
    ///   registration of `fd`. Nothing is forgotten and the descriptor is
    ///   handed back open.
    /// - Any error of [`forget`](Self::forget).
    pub fn forget_owned(&mut self, token: Token, fd: OwnedFd) -> Result<()> {
        let raw = fd.as_raw_fd();
        if self.fd_of(token) != Some(raw) {
            warn!(fd = raw, ?token, "descriptor does not belong to the registration");
            return Err(Error::ForeignDescriptor { token, fd });
        }

        let result = self.forget(token);
        drop(fd);

        result
    }

    /// Runs the event loop until the host asks it to stop.
    ///
    /// Each iteration checks [`SchedulerHost::should_shut_down`], waits for
    /// and dispatches one batch, then calls [`SchedulerHost::pump`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Wait`] as soon as a wait fails for any reason other
    /// than a signal interruption. No further callbacks run.
    pub fn run<H>(&mut self, host: &mut H) -> Result<()>
    where
        H: SchedulerHost<M> + ?Sized,
    {
        debug!("event loop started");

        while !host.should_shut_down() {
            self.turn()?;
            host.pump(self);
        }

        debug!("event loop stopped");
        Ok(())
    }

    /// Waits for one batch and dispatches it.
    ///
    /// Returns the number of callbacks invoked. An interrupted wait counts as
    /// an empty batch.
    ///
    /// # Panics
    ///
    /// Panics if called from inside a callback.
    ///
    /// A panic raised by a callback is propagated after the queue is made
    /// usable again: the callback stays registered and the undelivered rest
    /// of the batch is discarded.
    pub fn turn(&mut self) -> Result<usize> {
        assert!(!self.dispatching, "turn called while dispatching a batch");

        let fetched = match self.multiplexer.wait(&mut self.batch) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("wait interrupted");
                0
            }
            Err(e) => {
                error!(error = %e, "wait failed");
                return Err(Error::Wait(e));
            }
        };

        self.fetched = fetched.min(self.batch.len());
        self.cursor = 0;
        self.dispatching = true;

        let mut dispatched = 0;

        while self.cursor < self.fetched {
            let entry = self.batch[self.cursor];
            self.cursor += 1;

            let (events, data) = (entry.events, entry.u64);

            let Some(token) = Token::unpack(data) else {
                trace!("skipping cancelled entry");
                continue;
            };

            let mask = Mask::from_kernel(events);
            if mask.is_empty() {
                trace!(?token, "skipping entry narrowed to nothing");
                continue;
            }

            let Some(fd) = self.fd_of(token) else {
                trace!(?token, "skipping entry for a stale token");
                continue;
            };

            #[cfg(debug_assertions)]
            self.verify_reported(fd, mask);

            let Some(mut callback) = self
                .registry
                .get_mut(token)
                .and_then(|registration| registration.callback.take())
            else {
                continue;
            };

            trace!(fd, ?token, ?mask, "dispatching");
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback.on_event(self, mask)));

            // Put the callback back unless the registration was forgotten.
            if let Some(registration) = self.registry.get_mut(token) {
                debug_assert!(
                    registration.callback.is_none(),
                    "registration gained a callback while it was being dispatched"
                );
                registration.callback = Some(callback);
            }

            if let Err(payload) = outcome {
                let discarded = self.fetched - self.cursor;
                self.finish_batch();

                error!(fd, ?token, discarded, "callback panicked, batch abandoned");
                panic::resume_unwind(payload);
            }

            dispatched += 1;
        }

        self.finish_batch();
        Ok(dispatched)
    }

    fn finish_batch(&mut self) {
        self.dispatching = false;
        self.fetched = 0;
        self.cursor = 0;
    }

    /// Closes the multiplexer handle, reporting failure.
    ///
    /// Dropping the queue closes the handle too, but can only log a failure.
    pub fn close(mut self) -> Result<()> {
        self.close_multiplexer()
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.registry.len() == 0
    }

    /// Returns `true` if `token` names a live registration.
    pub fn is_watched(&self, token: Token) -> bool {
        self.registry.contains(token)
    }

    /// The currently requested mask of a live registration.
    pub fn mask_of(&self, token: Token) -> Option<Mask> {
        self.registry.get(token).map(|registration| registration.mask)
    }

    /// The descriptor of a live registration.
    pub fn fd_of(&self, token: Token) -> Option<RawFd> {
        self.registry.get(token).map(|registration| registration.fd)
    }

    /// The token of the live registration for `fd`, if any.
    pub fn token_of(&self, fd: RawFd) -> Option<Token> {
        self.by_fd.get(&fd).copied()
    }

    /// Maximum number of entries fetched per wait.
    pub fn batch_capacity(&self) -> usize {
        self.batch.len()
    }

    /// Applies `f` to every not-yet-dispatched entry of the current batch
    /// that was fetched for `token`. Returns how many entries matched.
    fn for_each_pending(&mut self, token: Token, mut f: impl FnMut(&mut epoll_event)) -> usize {
        let packed = token.pack();
        let mut matched = 0;

        for entry in &mut self.batch[self.cursor..self.fetched] {
            let data = entry.u64;
            if data == packed {
                f(entry);
                matched += 1;
            }
        }

        matched
    }

    #[cfg(debug_assertions)]
    fn verify_reported(&self, fd: RawFd, reported: Mask) {
        if let Some(requested) = self.requested.get(&fd) {
            debug_assert!(
                requested.contains(reported.difference(Mask::REPORT_ONLY)),
                "fd {fd} reported {reported:?} but only {requested:?} was requested"
            );
        }
    }

    fn close_multiplexer(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.registry.len() != 0 {
            let leftover: Vec<RawFd> = self.registry.iter().map(|(_, r)| r.fd).collect();
            warn!(?leftover, "closing event queue with live registrations");
        }

        self.multiplexer.close().map_err(|e| {
            error!(error = %e, "failed to close the multiplexer");
            Error::Close(e)
        })?;

        debug!("event queue closed");
        Ok(())
    }
}

impl<M: Multiplexer> Drop for EventQueue<M> {
    fn drop(&mut self) {
        // Failure is already logged by close_multiplexer.
        let _ = self.close_multiplexer();
    }
}

impl<M: Multiplexer> fmt::Debug for EventQueue<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("registrations", &self.registry.len())
            .field("batch_capacity", &self.batch.len())
            .field("dispatching", &self.dispatching)
            .finish()
    }
}

/// Kernel interest bits for a requested mask, edge-triggered.
fn interest(mask: Mask) -> u32 {
    mask.to_kernel() | EPOLLET as u32
}
