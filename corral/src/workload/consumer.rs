//! Consumer worker: pops items until its quota is met.

use std::thread;
use std::time::Duration;

use crate::sync::{BoundedBuffer, PopError, Timeout};
use crate::trace::{debug, trace};
use crate::workload::event::{Event, EventSink};
use crate::workload::{Exit, Item, Quota, WorkerId, WorkerOutcome};

pub struct Consumer {
    quota: Quota,
    delay: Duration,
}

impl Consumer {
    /// Creates consumer `index` (1-based) with a quota of `target` items.
    #[must_use]
    pub const fn new(index: usize, target: usize, delay: Duration) -> Self {
        Self {
            quota: Quota {
                worker: WorkerId::consumer(index),
                target,
            },
            delay,
        }
    }

    #[must_use]
    pub const fn quota(&self) -> Quota {
        self.quota
    }

    /// Runs the consume loop on the calling thread.
    ///
    /// Items still queued after shutdown are drained; the loop only ends
    /// early once the buffer is both shut down and empty.
    pub fn run(self, buffer: &BoundedBuffer<Item>, sink: &dyn EventSink) -> WorkerOutcome {
        let worker = self.quota.worker;
        let mut consumed = 0;

        while consumed < self.quota.target {
            match buffer.pop(Timeout::Infinite) {
                Ok((item, receipt)) => {
                    consumed += 1;
                    sink.record(&Event::Consumed {
                        worker,
                        item,
                        receipt,
                    });
                }
                Err(err) => {
                    debug_assert_eq!(err, PopError::Drained, "infinite pop only fails when drained");
                    debug!(%worker, consumed, "consumer stopped by shutdown");
                    sink.record(&Event::Stopped {
                        worker,
                        completed: consumed,
                        target: self.quota.target,
                    });
                    return self.outcome(consumed, Exit::Stopped);
                }
            }

            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }

        trace!(%worker, consumed, "consumer done");
        self.outcome(consumed, Exit::Done)
    }

    fn outcome(&self, completed: usize, exit: Exit) -> WorkerOutcome {
        WorkerOutcome {
            quota: self.quota,
            completed,
            exit,
        }
    }
}
