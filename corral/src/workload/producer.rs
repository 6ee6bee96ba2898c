//! Producer worker: generates items and pushes them until its quota is met.

use std::ops::RangeInclusive;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sync::{BoundedBuffer, Timeout};
use crate::trace::{debug, trace};
use crate::workload::event::{Event, EventSink};
use crate::workload::{Exit, Item, Quota, WorkerId, WorkerOutcome};

/// Range of generated item values.
pub const ITEM_RANGE: RangeInclusive<Item> = 100..=999;

pub struct Producer {
    quota: Quota,
    delay: Duration,
    rng: StdRng,
}

impl Producer {
    /// Creates producer `index` (1-based) with a quota of `target` items.
    ///
    /// With a seed the generated sequence is reproducible; without one the
    /// generator is seeded from the OS.
    #[must_use]
    pub fn new(index: usize, target: usize, delay: Duration, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            quota: Quota {
                worker: WorkerId::producer(index),
                target,
            },
            delay,
            rng,
        }
    }

    #[must_use]
    pub const fn quota(&self) -> Quota {
        self.quota
    }

    /// Runs the produce loop on the calling thread.
    ///
    /// Each iteration blocks on buffer space, pushes one item, and then
    /// sleeps for the configured delay with the lock released. Observing
    /// shutdown ends the loop without pushing the pending item.
    pub fn run(mut self, buffer: &BoundedBuffer<Item>, sink: &dyn EventSink) -> WorkerOutcome {
        let worker = self.quota.worker;
        let mut produced = 0;

        while produced < self.quota.target {
            let item = self.rng.gen_range(ITEM_RANGE);

            match buffer.push(item, Timeout::Infinite) {
                Ok(receipt) => {
                    produced += 1;
                    sink.record(&Event::Produced {
                        worker,
                        item,
                        receipt,
                    });
                }
                Err(err) => {
                    debug_assert!(err.is_shutdown(), "infinite push only fails on shutdown");
                    debug!(%worker, produced, "producer stopped by shutdown");
                    sink.record(&Event::Stopped {
                        worker,
                        completed: produced,
                        target: self.quota.target,
                    });
                    return self.outcome(produced, Exit::Stopped);
                }
            }

            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }

        trace!(%worker, produced, "producer done");
        self.outcome(produced, Exit::Done)
    }

    fn outcome(&self, completed: usize, exit: Exit) -> WorkerOutcome {
        WorkerOutcome {
            quota: self.quota,
            completed,
            exit,
        }
    }
}
