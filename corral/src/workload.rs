//! Worker lifecycle on top of [`BoundedBuffer`](crate::sync::BoundedBuffer).
//!
//! Each producer and consumer runs on its own OS thread with a fixed quota.
//! A worker ends in one of three states:
//!
//! ```text
//! Running ──quota reached──────────────> Done
//!    │
//!    └──shutdown observed at its wait──> Stopped
//! ```
//!
//! plus [`Exit::Panicked`] when the thread unwinds. The [`driver`] decides
//! when to request shutdown.

pub mod config;
pub mod consumer;
pub mod driver;
pub mod event;
pub mod producer;

use std::fmt;

/// Item type moved through the simulation buffer.
pub type Item = u32;

/// Which side of the buffer a worker sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => f.write_str("Producer"),
            Self::Consumer => f.write_str("Consumer"),
        }
    }
}

/// Identity of a worker: its role and 1-based index within that role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub role: Role,
    pub index: usize,
}

impl WorkerId {
    #[must_use]
    pub const fn producer(index: usize) -> Self {
        Self {
            role: Role::Producer,
            index,
        }
    }

    #[must_use]
    pub const fn consumer(index: usize) -> Self {
        Self {
            role: Role::Consumer,
            index,
        }
    }

    /// Thread name used when spawning this worker, e.g. `producer-2`.
    #[must_use]
    pub fn thread_name(&self) -> String {
        match self.role {
            Role::Producer => format!("producer-{}", self.index),
            Role::Consumer => format!("consumer-{}", self.index),
        }
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.index)
    }
}

/// Immutable per-worker assignment fixed at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub worker: WorkerId,
    /// Number of items the worker moves before it is done.
    pub target: usize,
}

/// Terminal state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Quota reached.
    Done,
    /// Shutdown observed before the quota was reached.
    Stopped,
    /// The worker thread panicked.
    Panicked,
}

/// What a worker reports when it terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOutcome {
    pub quota: Quota,
    /// Items produced or consumed.
    pub completed: usize,
    pub exit: Exit,
}

impl WorkerOutcome {
    #[must_use]
    pub const fn worker(&self) -> WorkerId {
        self.quota.worker
    }
}
