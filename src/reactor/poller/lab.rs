//! Deterministic lab multiplexer for testing.
//!
//! [`LabMultiplexer`] behaves like an `epoll` instance without touching the
//! kernel. Registrations are tracked in memory and every `wait` call pops the
//! next scripted step, so tests decide exactly which entries end up in each
//! batch and in which order.
//!
//! The multiplexer is a cheap handle: clones share the same state, so a test
//! can keep one clone for scripting and inspection while the queue owns the
//! other.
//!
//! # Example
//!
//! ```ignore
//! use readyq::{EventQueueBuilder, LabMultiplexer, Mask};
//!
//! let lab = LabMultiplexer::new();
//! let mut queue = EventQueueBuilder::new().build_with(lab.clone());
//!
//! queue.watch(5, Mask::READABLE, |_: &mut _, mask: Mask| println!("{mask:?}"))?;
//! lab.ready(&[(5, Mask::READABLE)]);
//!
//! assert_eq!(queue.turn()?, 1);
//! ```

use super::Multiplexer;
use crate::reactor::Mask;

use libc::{EPOLLERR, EPOLLHUP, epoll_event};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::rc::Rc;

/// One scripted outcome of a `wait` call.
#[derive(Debug, Clone)]
enum Step {
    Ready {
        entries: Vec<(RawFd, Mask)>,
        filtered: bool,
    },
    Interrupted,
    Fail(i32),
}

#[derive(Debug, Default)]
struct State {
    /// Live registrations: interest bits and user data per descriptor.
    registrations: HashMap<RawFd, (u32, u64)>,
    script: VecDeque<Step>,
    /// Errno injected into the next add/modify/delete call.
    control_failure: Option<i32>,
    waits: usize,
    closes: usize,
}

/// Scripted, in-memory stand-in for an `epoll` instance.
#[derive(Debug, Clone, Default)]
pub struct LabMultiplexer {
    state: Rc<RefCell<State>>,
}

impl LabMultiplexer {
    /// Creates a lab multiplexer with no registrations and an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a wait that reports the given `(fd, mask)` pairs, in order.
    ///
    /// As with the kernel, entries are resolved when the wait happens: pairs
    /// naming a descriptor that is not registered at that point are dropped,
    /// and reported bits are limited to the registered interest plus
    /// `ERROR` and `HANGUP`. Entries that do not fit in the caller's batch
    /// are reported by the following wait.
    pub fn ready(&self, entries: &[(RawFd, Mask)]) {
        self.push(Step::Ready {
            entries: entries.to_vec(),
            filtered: true,
        });
    }

    /// Like [`ready`](Self::ready), but reports the masks as given, even bits
    /// outside the registered interest. Models a misbehaving kernel.
    pub fn ready_raw(&self, entries: &[(RawFd, Mask)]) {
        self.push(Step::Ready {
            entries: entries.to_vec(),
            filtered: false,
        });
    }

    /// Scripts a wait that is interrupted by a signal (`EINTR`).
    pub fn interrupted(&self) {
        self.push(Step::Interrupted);
    }

    /// Scripts a wait that fails with `errno`.
    pub fn fail(&self, errno: i32) {
        self.push(Step::Fail(errno));
    }

    /// Makes the next add, modify or delete call fail with `errno`.
    pub fn fail_next_control(&self, errno: i32) {
        self.state.borrow_mut().control_failure = Some(errno);
    }

    /// Returns `true` if `fd` currently has a registration.
    pub fn is_registered(&self, fd: RawFd) -> bool {
        self.state.borrow().registrations.contains_key(&fd)
    }

    /// Interest currently registered for `fd`, without the edge flag.
    pub fn interest(&self, fd: RawFd) -> Option<Mask> {
        self.state
            .borrow()
            .registrations
            .get(&fd)
            .map(|&(interest, _)| Mask::from_kernel(interest))
    }

    /// Returns `true` if the registration for `fd` is edge-triggered.
    pub fn is_edge_triggered(&self, fd: RawFd) -> bool {
        self.state
            .borrow()
            .registrations
            .get(&fd)
            .is_some_and(|&(interest, _)| interest & libc::EPOLLET as u32 != 0)
    }

    /// Number of live registrations.
    pub fn registrations(&self) -> usize {
        self.state.borrow().registrations.len()
    }

    /// Number of `wait` calls made so far.
    pub fn waits(&self) -> usize {
        self.state.borrow().waits
    }

    /// Number of `close` calls made so far.
    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }

    /// Simulates the owner closing `fd` without forgetting it first: the
    /// registration disappears as it would from the kernel.
    pub fn close_fd(&self, fd: RawFd) {
        self.state.borrow_mut().registrations.remove(&fd);
    }

    fn push(&self, step: Step) {
        self.state.borrow_mut().script.push_back(step);
    }

    fn take_control_failure(&self) -> io::Result<()> {
        match self.state.borrow_mut().control_failure.take() {
            Some(errno) => Err(io::Error::from_raw_os_error(errno)),
            None => Ok(()),
        }
    }
}

/// Kernel bits for a reported mask, report-only bits included.
fn reported_bits(mask: Mask) -> u32 {
    let mut bits = mask.intersection(Mask::REQUESTABLE).to_kernel();

    if mask.contains(Mask::ERROR) {
        bits |= EPOLLERR as u32;
    }
    if mask.contains(Mask::HANGUP) {
        bits |= EPOLLHUP as u32;
    }

    bits
}

impl Multiplexer for LabMultiplexer {
    fn add(&mut self, fd: RawFd, interest: u32, data: u64) -> io::Result<()> {
        self.take_control_failure()?;

        let mut state = self.state.borrow_mut();
        if state.registrations.contains_key(&fd) {
            return Err(io::Error::from_raw_os_error(libc::EEXIST));
        }

        state.registrations.insert(fd, (interest, data));
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, interest: u32, data: u64) -> io::Result<()> {
        self.take_control_failure()?;

        let mut state = self.state.borrow_mut();
        match state.registrations.get_mut(&fd) {
            Some(registration) => {
                *registration = (interest, data);
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn delete(&mut self, fd: RawFd) -> io::Result<()> {
        self.take_control_failure()?;

        match self.state.borrow_mut().registrations.remove(&fd) {
            Some(_) => Ok(()),
            None => Err(io::Error::from_raw_os_error(libc::ENOENT)),
        }
    }

    fn wait(&mut self, batch: &mut [epoll_event]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        state.waits += 1;

        let step = state
            .script
            .pop_front()
            .ok_or_else(|| io::Error::other("lab multiplexer script exhausted"))?;

        let (entries, filtered) = match step {
            Step::Ready { entries, filtered } => (entries, filtered),
            Step::Interrupted => return Err(io::Error::from_raw_os_error(libc::EINTR)),
            Step::Fail(errno) => return Err(io::Error::from_raw_os_error(errno)),
        };

        let mut n = 0;
        let mut rest = Vec::new();

        for (fd, mask) in entries {
            let Some(&(interest, data)) = state.registrations.get(&fd) else {
                continue;
            };

            if n == batch.len() {
                rest.push((fd, mask));
                continue;
            }

            let mut events = reported_bits(mask);
            if filtered {
                events &= interest | (EPOLLERR | EPOLLHUP) as u32;
            }
            if events == 0 {
                continue;
            }

            batch[n] = epoll_event { events, u64: data };
            n += 1;
        }

        if !rest.is_empty() {
            state.script.push_front(Step::Ready {
                entries: rest,
                filtered,
            });
        }

        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.borrow_mut().closes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_batch(len: usize) -> Vec<epoll_event> {
        vec![epoll_event { events: 0, u64: 0 }; len]
    }

    #[test]
    fn duplicate_add_and_missing_delete_mirror_the_kernel() {
        let mut lab = LabMultiplexer::new();

        lab.add(3, libc::EPOLLIN as u32, 1).unwrap();
        let error = lab.add(3, libc::EPOLLIN as u32, 1).unwrap_err();
        assert_eq!(error.raw_os_error(), Some(libc::EEXIST));

        lab.delete(3).unwrap();
        let error = lab.delete(3).unwrap_err();
        assert_eq!(error.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn reports_are_limited_to_interest() {
        let mut lab = LabMultiplexer::new();
        lab.add(4, libc::EPOLLIN as u32, 42).unwrap();
        lab.ready(&[(4, Mask::READABLE | Mask::WRITABLE | Mask::HANGUP), (9, Mask::READABLE)]);

        let mut batch = empty_batch(4);
        assert_eq!(lab.wait(&mut batch).unwrap(), 1);

        let entry = batch[0];
        let (events, data) = (entry.events, entry.u64);
        assert_eq!(Mask::from_kernel(events), Mask::READABLE | Mask::HANGUP);
        assert_eq!(data, 42);
    }

    #[test]
    fn raw_reports_skip_the_interest_filter() {
        let mut lab = LabMultiplexer::new();
        lab.add(4, libc::EPOLLIN as u32, 42).unwrap();
        lab.ready_raw(&[(4, Mask::WRITABLE)]);

        let mut batch = empty_batch(1);
        assert_eq!(lab.wait(&mut batch).unwrap(), 1);

        let events = batch[0].events;
        assert_eq!(Mask::from_kernel(events), Mask::WRITABLE);
    }

    #[test]
    fn overflow_carries_into_the_next_wait() {
        let mut lab = LabMultiplexer::new();
        for fd in 0..3 {
            lab.add(fd, libc::EPOLLIN as u32, fd as u64).unwrap();
        }
        lab.ready(&[(0, Mask::READABLE), (1, Mask::READABLE), (2, Mask::READABLE)]);

        let mut batch = empty_batch(2);
        assert_eq!(lab.wait(&mut batch).unwrap(), 2);
        assert_eq!(lab.wait(&mut batch).unwrap(), 1);

        let data = batch[0].u64;
        assert_eq!(data, 2);
    }

    #[test]
    fn exhausted_script_fails_the_wait() {
        let mut lab = LabMultiplexer::new();
        let mut batch = empty_batch(1);

        assert!(lab.wait(&mut batch).is_err());
        assert_eq!(lab.waits(), 1);
    }
}
