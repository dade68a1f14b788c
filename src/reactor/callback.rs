use super::core::EventQueue;
use super::mask::Mask;
use super::poller::{Epoll, Multiplexer};

/// Receiver of readiness notifications for one registration.
///
/// The queue hands itself to the callback so the owner of a resource can
/// `watch`, `adjust` or `forget` from inside `on_event`, including for the
/// registration currently being dispatched.
///
/// Any `FnMut(&mut EventQueue<M>, Mask)` closure is a callback.
pub trait EventCallback<M: Multiplexer = Epoll> {
    /// Called with the readiness reported for the registration.
    ///
    /// Never called concurrently, and never with an empty mask.
    fn on_event(&mut self, queue: &mut EventQueue<M>, mask: Mask);
}

impl<M, F> EventCallback<M> for F
where
    M: Multiplexer,
    F: FnMut(&mut EventQueue<M>, Mask),
{
    fn on_event(&mut self, queue: &mut EventQueue<M>, mask: Mask) {
        self(queue, mask)
    }
}

/// The scheduler that owns and drives a queue through
/// [`EventQueue::run`].
pub trait SchedulerHost<M: Multiplexer = Epoll> {
    /// Polled once per iteration, before the queue blocks.
    fn should_shut_down(&mut self) -> bool;

    /// Called once per iteration, after the whole batch has been dispatched.
    fn pump(&mut self, queue: &mut EventQueue<M>);
}
