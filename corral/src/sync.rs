//! Synchronization primitives shared between worker threads.
//!
//! - [`bounded`] - Fixed-capacity FIFO guarded by one mutex and two condition variables

pub mod bounded;

pub use bounded::{BoundedBuffer, PopError, PushError, Receipt, Stats, Timeout, ZeroCapacity};
