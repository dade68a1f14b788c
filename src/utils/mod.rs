//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the queue.
//! In particular, it exposes a generational [`Slab`] used as the
//! registration registry.

mod slab;

pub(crate) use slab::Slab;
