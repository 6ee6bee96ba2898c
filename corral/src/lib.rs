//! Bounded-buffer producer/consumer core.
//!
//! - [`sync`] - The [`BoundedBuffer`]: one mutex, two condition variables, a shutdown flag
//! - [`workload`] - Producer and consumer workers with fixed quotas, and the
//!   [`Simulation`] driver that spawns, joins, and shuts them down
//!
//! Internal tracing is opt-in through the `tracing` feature; see [`init_tracing`].

mod trace;

pub mod sync;
pub mod workload;

pub use sync::{BoundedBuffer, PopError, PushError, Receipt, Stats, Timeout};
pub use trace::init_tracing;
pub use workload::driver::{Simulation, SimulationError, Summary};
