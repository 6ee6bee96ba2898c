//! Blocking bounded FIFO buffer for multi-producer, multi-consumer use.
//!
//! # Overview
//!
//! A [`BoundedBuffer`] owns three things:
//! - the item queue together with the shutdown flag, behind a single [`Mutex`]
//! - `not_full`, a [`Condvar`] producers park on while the queue is full
//! - `not_empty`, a [`Condvar`] consumers park on while the queue is empty
//!
//! Every read or write of the queue length, the items, or the shutdown flag
//! happens with the mutex held. Waits re-evaluate their predicate after each
//! wake, so spurious wakeups and stolen notifications are harmless.
//!
//! # Shutdown
//!
//! [`BoundedBuffer::shutdown`] is a one-way switch. Once set:
//! - blocked and future [`push`](BoundedBuffer::push) calls fail with
//!   [`PushError::Shutdown`], even if space is available
//! - [`pop`](BoundedBuffer::pop) keeps returning queued items and fails with
//!   [`PopError::Drained`] once the queue is empty
//!
//! # Example
//!
//! ```
//! use corral::sync::{BoundedBuffer, PopError, Timeout};
//!
//! let buffer = BoundedBuffer::new(2).unwrap();
//!
//! let receipt = buffer.push(7, Timeout::Infinite).unwrap();
//! assert_eq!((receipt.seq, receipt.len), (0, 1));
//!
//! buffer.shutdown();
//! assert!(buffer.push(8, Timeout::Infinite).is_err());
//!
//! let (item, _) = buffer.pop(Timeout::Infinite).unwrap();
//! assert_eq!(item, 7);
//! assert_eq!(buffer.pop(Timeout::Infinite), Err(PopError::Drained));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

use crate::trace::{debug, trace};

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl Timeout {
    fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            // A deadline past the end of the clock is as good as none.
            Self::Duration(d) => Instant::now().checked_add(d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

/// Returned by [`BoundedBuffer::new`] for a capacity of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("buffer capacity must be greater than 0")]
pub struct ZeroCapacity;

/// Outcome of a successful push or pop, observed under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Zero-based index of this operation among all pushes (or all pops).
    ///
    /// Because the buffer is strictly FIFO, the item pushed with `seq == k`
    /// is the item popped with `seq == k`.
    pub seq: u64,
    /// Queue length right after the operation.
    pub len: usize,
}

/// Error returned by [`BoundedBuffer::push`]. The rejected item is handed back.
#[derive(PartialEq, Eq)]
pub enum PushError<T> {
    /// The buffer was shut down before space became available.
    Shutdown(T),
    /// The timeout elapsed while the buffer stayed full.
    Timeout(T),
}

impl<T> PushError<T> {
    /// Returns the item that could not be pushed.
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Shutdown(item) | Self::Timeout(item) => item,
        }
    }

    /// Returns `true` if the push failed because of shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown(_))
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown(_) => f.write_str("Shutdown(..)"),
            Self::Timeout(_) => f.write_str("Timeout(..)"),
        }
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown(_) => f.write_str("push into a shut down buffer"),
            Self::Timeout(_) => f.write_str("timed out waiting for buffer space"),
        }
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Error returned by [`BoundedBuffer::pop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PopError {
    /// The buffer is shut down and no items remain.
    #[error("buffer is shut down and drained")]
    Drained,
    /// The timeout elapsed while the buffer stayed empty.
    #[error("timed out waiting for an item")]
    Timeout,
}

/// Point-in-time view of the buffer, taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Fixed capacity.
    pub capacity: usize,
    /// Current number of queued items.
    pub len: usize,
    /// Total successful pushes.
    pub pushed: u64,
    /// Total successful pops.
    pub popped: u64,
    /// Largest length ever observed after a push.
    pub high_water: usize,
    /// Whether shutdown has been requested.
    pub shutdown: bool,
    /// Producers currently parked waiting for space.
    pub parked_producers: usize,
    /// Consumers currently parked waiting for an item.
    pub parked_consumers: usize,
}

/// Which condition a blocked caller is parked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// Producers waiting for space.
    Push,
    /// Consumers waiting for an item.
    Pop,
}

/// Lock-protected state. Only reachable through the mutex guard.
struct Slots<T> {
    items: VecDeque<T>,
    capacity: usize,
    shutdown: bool,
    pushed: u64,
    popped: u64,
    high_water: usize,
    parked_producers: usize,
    parked_consumers: usize,
}

impl<T> Slots<T> {
    fn parked(&mut self, side: Side) -> &mut usize {
        match side {
            Side::Push => &mut self.parked_producers,
            Side::Pop => &mut self.parked_consumers,
        }
    }

    fn space_available(&self) -> bool {
        self.items.len() < self.capacity || self.shutdown
    }

    fn item_available(&self) -> bool {
        !self.items.is_empty() || self.shutdown
    }

    /// Appends an item. The caller has established `len < capacity`.
    fn push_back(&mut self, item: T) -> Receipt {
        debug_assert!(self.items.len() < self.capacity, "push into a full buffer");
        self.items.push_back(item);
        let seq = self.pushed;
        self.pushed += 1;
        let len = self.items.len();
        self.high_water = self.high_water.max(len);
        Receipt { seq, len }
    }

    fn pop_front(&mut self) -> Option<(T, Receipt)> {
        let item = self.items.pop_front()?;
        let seq = self.popped;
        self.popped += 1;
        Some((
            item,
            Receipt {
                seq,
                len: self.items.len(),
            },
        ))
    }
}

/// Fixed-capacity FIFO shared by producer and consumer threads.
///
/// Share it with `Arc<BoundedBuffer<T>>`; all methods take `&self`.
pub struct BoundedBuffer<T> {
    slots: Mutex<Slots<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Creates an empty buffer holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`ZeroCapacity`] if `capacity == 0`; such a buffer could never
    /// accept an item.
    pub fn new(capacity: usize) -> Result<Self, ZeroCapacity> {
        if capacity == 0 {
            return Err(ZeroCapacity);
        }
        Ok(Self {
            slots: Mutex::new(Slots {
                items: VecDeque::with_capacity(capacity),
                capacity,
                shutdown: false,
                pushed: 0,
                popped: 0,
                high_water: 0,
                parked_producers: 0,
                parked_consumers: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    /// Pushes an item, blocking while the buffer is full.
    ///
    /// Shutdown takes priority over free space: once shutdown is observed the
    /// item is returned without being queued. After the lock is released one
    /// waiting consumer is notified.
    ///
    /// # Errors
    ///
    /// - [`PushError::Shutdown`] if the buffer is (or becomes) shut down
    /// - [`PushError::Timeout`] if `timeout` elapses while the buffer stays full
    pub fn push(&self, item: T, timeout: Timeout) -> Result<Receipt, PushError<T>> {
        let (mut slots, ready) =
            self.wait_until(&self.not_full, timeout, Slots::space_available, Side::Push);

        if slots.shutdown {
            return Err(PushError::Shutdown(item));
        }
        if !ready {
            return Err(PushError::Timeout(item));
        }

        let receipt = slots.push_back(item);
        drop(slots);
        self.not_empty.notify_one();
        Ok(receipt)
    }

    /// Pops the oldest item, blocking while the buffer is empty.
    ///
    /// Items queued before shutdown are still handed out; only an empty,
    /// shut down buffer reports [`PopError::Drained`]. After the lock is
    /// released one waiting producer is notified.
    ///
    /// # Errors
    ///
    /// - [`PopError::Drained`] if the buffer is shut down and empty
    /// - [`PopError::Timeout`] if `timeout` elapses while the buffer stays empty
    pub fn pop(&self, timeout: Timeout) -> Result<(T, Receipt), PopError> {
        let (mut slots, _) =
            self.wait_until(&self.not_empty, timeout, Slots::item_available, Side::Pop);

        if let Some(popped) = slots.pop_front() {
            drop(slots);
            self.not_full.notify_one();
            return Ok(popped);
        }

        if slots.shutdown {
            Err(PopError::Drained)
        } else {
            Err(PopError::Timeout)
        }
    }

    /// Requests shutdown and wakes every parked producer and consumer.
    ///
    /// Idempotent. Returns `true` only for the call that flipped the flag.
    pub fn shutdown(&self) -> bool {
        let mut slots = self.lock();
        let first = !slots.shutdown;
        slots.shutdown = true;
        if first {
            debug!(
                len = slots.items.len(),
                parked_producers = slots.parked_producers,
                parked_consumers = slots.parked_consumers,
                "buffer shutdown requested"
            );
        }
        drop(slots);

        self.not_full.notify_all();
        self.not_empty.notify_all();
        first
    }

    /// Returns the fixed capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Returns `true` if no items are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Returns `true` once shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    /// Takes a consistent snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let slots = self.lock();
        Stats {
            capacity: slots.capacity,
            len: slots.items.len(),
            pushed: slots.pushed,
            popped: slots.popped,
            high_water: slots.high_water,
            shutdown: slots.shutdown,
            parked_producers: slots.parked_producers,
            parked_consumers: slots.parked_consumers,
        }
    }

    /// Locks the state.
    ///
    /// No user code runs while the lock is held and every mutation is a
    /// single queue operation plus counter updates, so a poisoned lock still
    /// guards consistent state.
    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state and waits on `signal` until `ready` holds or the
    /// timeout elapses. Returns the guard and whether `ready` held.
    ///
    /// While parked the caller is counted in [`Stats`] under its `side`.
    fn wait_until(
        &self,
        signal: &Condvar,
        timeout: Timeout,
        ready: fn(&Slots<T>) -> bool,
        side: Side,
    ) -> (MutexGuard<'_, Slots<T>>, bool) {
        let mut slots = self.lock();
        if ready(&slots) {
            return (slots, true);
        }

        trace!(?side, len = slots.items.len(), "parking");
        *slots.parked(side) += 1;

        let mut woke = true;
        match timeout.deadline() {
            None => {
                slots = signal
                    .wait_while(slots, |s| !ready(s))
                    .unwrap_or_else(PoisonError::into_inner);
            }
            Some(deadline) => loop {
                let now = Instant::now();
                if now >= deadline {
                    trace!(?side, "wait timed out");
                    woke = false;
                    break;
                }
                let (guard, _) = signal
                    .wait_timeout(slots, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                slots = guard;
                if ready(&slots) {
                    break;
                }
            },
        }

        *slots.parked(side) -= 1;
        trace!(?side, len = slots.items.len(), shutdown = slots.shutdown, "woke");
        (slots, woke)
    }
}

impl<T> fmt::Debug for BoundedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
