use crate::error::{Error, Result};
use crate::reactor::{Epoll, EventQueue, Multiplexer};

/// Default maximum number of entries fetched per wait.
const DEFAULT_BATCH_CAPACITY: usize = 64;

/// Default number of registry slots reserved up front.
const DEFAULT_REGISTRY_CAPACITY: usize = 64;

/// Builder for configuring and creating an event queue.
///
/// # Examples
///
/// ```rust,ignore
/// let queue = EventQueueBuilder::new()
///     .batch_capacity(256)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct EventQueueBuilder {
    /// Maximum number of entries fetched per wait.
    batch_capacity: usize,
    /// Registry slots reserved up front.
    registry_capacity: usize,
}

impl EventQueueBuilder {
    /// Creates a new `EventQueueBuilder` with default configuration.
    ///
    /// By default a wait fetches up to 64 entries and the registry reserves
    /// room for 64 registrations.
    pub fn new() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
        }
    }

    /// Sets the maximum number of entries fetched per wait.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn batch_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "batch_capacity must be > 0");

        self.batch_capacity = n;
        self
    }

    /// Sets how many registrations the registry reserves room for.
    ///
    /// The registry still grows past this number.
    pub fn registry_capacity(mut self, n: usize) -> Self {
        self.registry_capacity = n;
        self
    }

    /// Builds a queue backed by a new `epoll` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Create`] if the `epoll` instance cannot be created.
    pub fn build(self) -> Result<EventQueue<Epoll>> {
        let epoll = Epoll::new().map_err(|e| {
            tracing::error!(error = %e, "failed to create epoll instance");
            Error::Create(e)
        })?;

        Ok(self.build_with(epoll))
    }

    /// Builds a queue around an existing multiplexer.
    pub fn build_with<M: Multiplexer>(self, multiplexer: M) -> EventQueue<M> {
        EventQueue::from_parts(multiplexer, self.batch_capacity, self.registry_capacity)
    }
}

impl Default for EventQueueBuilder {
    /// Creates a default `EventQueueBuilder`.
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::LabMultiplexer;

    #[test]
    fn defaults() {
        let queue = EventQueueBuilder::new().build_with(LabMultiplexer::new());

        assert_eq!(queue.batch_capacity(), DEFAULT_BATCH_CAPACITY);
        assert!(queue.is_empty());
    }

    #[test]
    fn custom_batch_capacity() {
        let queue = EventQueueBuilder::new()
            .batch_capacity(3)
            .registry_capacity(1)
            .build_with(LabMultiplexer::new());

        assert_eq!(queue.batch_capacity(), 3);
    }

    #[test]
    #[should_panic(expected = "batch_capacity must be > 0")]
    fn zero_batch_capacity_panics() {
        let _ = EventQueueBuilder::new().batch_capacity(0);
    }
}
