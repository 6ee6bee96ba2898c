//! Driver: spawns the workers, decides when to shut down, and joins them.
//!
//! # Shutdown policy
//!
//! Workers stop on their own once their quotas are met. Quotas need not
//! balance, though: with more consumer quota than items, the surplus
//! consumers would park forever on an empty buffer, and vice versa for
//! producers on a full one. The driver requests shutdown when one of them
//! can no longer make progress:
//!
//! - all producers gone: no new items will arrive, consumers drain what is
//!   left and then stop
//! - all consumers gone *and* a producer is parked on a full buffer: no
//!   space will ever be freed, producers stop
//!
//! Producers that still have room keep filling the buffer after the last
//! consumer leaves. While that is the case the driver polls the buffer
//! every [`STALL_CHECK_INTERVAL`] for a parked producer.
//!
//! After every thread has been joined the driver broadcasts shutdown once
//! more. In a correct run this final broadcast finds nobody waiting and is a
//! no-op.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use corral::Simulation;
//! use corral::workload::config::SimulationConfig;
//! use corral::workload::event::NullSink;
//!
//! let config = SimulationConfig {
//!     producer_delay: Duration::ZERO,
//!     consumer_delay: Duration::ZERO,
//!     ..SimulationConfig::default()
//! };
//!
//! let summary = Simulation::new(config)?.run(Arc::new(NullSink))?;
//! assert_eq!(summary.produced, 10);
//! assert_eq!(summary.consumed, 10);
//! assert_eq!(summary.final_len, 0);
//! # Ok::<(), corral::SimulationError>(())
//! ```

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;

use crate::sync::BoundedBuffer;
use crate::trace::{debug, error, info, warn};
use crate::workload::config::{ConfigError, SimulationConfig};
use crate::workload::consumer::Consumer;
use crate::workload::event::{Event, EventSink};
use crate::workload::producer::Producer;
use crate::workload::{Exit, Item, Quota, Role, WorkerId, WorkerOutcome};

/// How often the driver checks for a stalled producer once every consumer has
/// terminated.
pub const STALL_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Error running a simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// The configuration was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The OS refused to start a worker thread.
    #[error("failed to spawn {worker}: {source}")]
    Spawn {
        worker: WorkerId,
        #[source]
        source: std::io::Error,
    },
    /// A worker thread panicked.
    #[error("{worker} panicked")]
    WorkerPanicked { worker: WorkerId },
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    /// Total successful pushes.
    pub produced: u64,
    /// Total successful pops.
    pub consumed: u64,
    /// Items left in the buffer after every worker terminated.
    pub final_len: usize,
    /// Largest buffer length observed during the run.
    pub high_water: usize,
    /// Workers that ended through shutdown rather than by meeting their quota.
    pub stopped_early: usize,
    /// One entry per worker, producers first, in spawn order.
    pub outcomes: Vec<WorkerOutcome>,
    pub elapsed: Duration,
}

/// Reports a worker's outcome to the driver, or [`Exit::Panicked`] if the
/// worker unwinds before reporting.
struct Departure {
    quota: Quota,
    done: Option<Sender<WorkerOutcome>>,
}

impl Departure {
    fn report(mut self, outcome: WorkerOutcome) {
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

impl Drop for Departure {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(WorkerOutcome {
                quota: self.quota,
                completed: 0,
                exit: Exit::Panicked,
            });
        }
    }
}

/// A configured run, ready to start.
pub struct Simulation {
    config: SimulationConfig,
    buffer: Arc<BoundedBuffer<Item>>,
}

impl Simulation {
    /// Validates `config` and creates the shared buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::Config`] for an invalid configuration.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let buffer = BoundedBuffer::new(config.capacity).map_err(ConfigError::from)?;
        Ok(Self {
            config,
            buffer: Arc::new(buffer),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The buffer the workers will share.
    #[must_use]
    pub const fn buffer(&self) -> &Arc<BoundedBuffer<Item>> {
        &self.buffer
    }

    /// Runs every worker to completion and reports the totals.
    ///
    /// # Errors
    ///
    /// - [`SimulationError::Spawn`] if a worker thread cannot be started; the
    ///   workers already running are shut down and joined first
    /// - [`SimulationError::WorkerPanicked`] if any worker panicked; all
    ///   other workers are still shut down and joined
    pub fn run(self, sink: Arc<dyn EventSink>) -> Result<Summary, SimulationError> {
        let Self { config, buffer } = self;
        let started = Instant::now();

        info!(
            capacity = config.capacity,
            producers = config.producers,
            consumers = config.consumers,
            items_per_producer = config.items_per_producer,
            items_per_consumer = config.items_per_consumer,
            "simulation starting"
        );
        if !config.is_balanced() {
            warn!(
                production = config.total_production(),
                consumption = config.total_consumption(),
                "quotas do not balance; some workers will stop early"
            );
        }

        sink.record(&Event::Started {
            producers: config.producers,
            consumers: config.consumers,
            capacity: config.capacity,
        });

        let (done_tx, done_rx) = mpsc::channel();
        let mut handles = Vec::with_capacity(config.producers + config.consumers);

        let workers = (1..=config.producers)
            .map(WorkerId::producer)
            .chain((1..=config.consumers).map(WorkerId::consumer));

        for worker in workers {
            match spawn_worker(worker, &config, &buffer, &sink, &done_tx) {
                Ok(handle) => handles.push((worker, handle)),
                Err(source) => {
                    error!(%worker, error = %source, "failed to spawn worker");
                    buffer.shutdown();
                    drop(done_tx);
                    join_all(handles);
                    return Err(SimulationError::Spawn { worker, source });
                }
            }
        }
        drop(done_tx);

        let mut producers_left = config.producers;
        let mut consumers_left = config.consumers;
        if producers_left == 0 {
            buffer.shutdown();
        }

        // Every sender is owned by a Departure, so this ends once each worker
        // has reported, panicking or not.
        let mut outcomes = Vec::with_capacity(handles.len());
        while let Some(outcome) = next_outcome(&done_rx, &buffer, consumers_left == 0) {
            debug!(worker = %outcome.worker(), exit = ?outcome.exit, completed = outcome.completed, "worker finished");
            match outcome.worker().role {
                Role::Producer => producers_left -= 1,
                Role::Consumer => consumers_left -= 1,
            }
            if producers_left == 0 && buffer.shutdown() {
                debug!(consumers_left, "all producers finished, shutting down");
            }
            outcomes.push(outcome);
        }

        let panicked = join_all(handles);

        if buffer.shutdown() {
            warn!("final shutdown broadcast found the buffer still open");
        }

        if let Some(worker) = panicked {
            return Err(SimulationError::WorkerPanicked { worker });
        }

        outcomes.sort_by_key(|outcome| {
            let worker = outcome.worker();
            (worker.role == Role::Consumer, worker.index)
        });

        let stats = buffer.stats();
        debug_assert_eq!(stats.pushed, stats.popped + stats.len as u64);

        let summary = Summary {
            produced: stats.pushed,
            consumed: stats.popped,
            final_len: stats.len,
            high_water: stats.high_water,
            stopped_early: outcomes
                .iter()
                .filter(|outcome| outcome.exit == Exit::Stopped)
                .count(),
            outcomes,
            elapsed: started.elapsed(),
        };

        sink.record(&Event::Finished {
            produced: summary.produced,
            consumed: summary.consumed,
            final_len: summary.final_len,
        });

        info!(
            produced = summary.produced,
            consumed = summary.consumed,
            final_len = summary.final_len,
            stopped_early = summary.stopped_early,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "simulation finished"
        );

        Ok(summary)
    }
}

fn spawn_worker(
    worker: WorkerId,
    config: &SimulationConfig,
    buffer: &Arc<BoundedBuffer<Item>>,
    sink: &Arc<dyn EventSink>,
    done: &Sender<WorkerOutcome>,
) -> std::io::Result<JoinHandle<()>> {
    let buffer = Arc::clone(buffer);
    let sink = Arc::clone(sink);
    let builder = thread::Builder::new().name(worker.thread_name());

    match worker.role {
        Role::Producer => {
            let producer = Producer::new(
                worker.index,
                config.items_per_producer,
                config.producer_delay,
                config.producer_seed(worker.index),
            );
            let departure = Departure {
                quota: producer.quota(),
                done: Some(done.clone()),
            };
            debug!(%worker, quota = config.items_per_producer, "spawning producer");
            builder.spawn(move || departure.report(producer.run(&buffer, &*sink)))
        }
        Role::Consumer => {
            let consumer =
                Consumer::new(worker.index, config.items_per_consumer, config.consumer_delay);
            let departure = Departure {
                quota: consumer.quota(),
                done: Some(done.clone()),
            };
            debug!(%worker, quota = config.items_per_consumer, "spawning consumer");
            builder.spawn(move || departure.report(consumer.run(&buffer, &*sink)))
        }
    }
}

/// Joins every handle and returns the first worker that panicked.
/// Waits for the next worker to report.
///
/// Once no consumer is left, a producer parked on the full buffer can never
/// be woken by anything but shutdown, so the wait is sliced and the buffer is
/// checked between slices.
fn next_outcome(
    done_rx: &Receiver<WorkerOutcome>,
    buffer: &BoundedBuffer<Item>,
    consumers_gone: bool,
) -> Option<WorkerOutcome> {
    if !consumers_gone {
        return done_rx.recv().ok();
    }
    loop {
        let parked = buffer.stats().parked_producers;
        if parked > 0 && buffer.shutdown() {
            debug!(parked, "no consumers left and a producer is stalled, shutting down");
        }
        match done_rx.recv_timeout(STALL_CHECK_INTERVAL) {
            Ok(outcome) => return Some(outcome),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
}

fn join_all(handles: Vec<(WorkerId, JoinHandle<()>)>) -> Option<WorkerId> {
    let mut panicked = None;
    for (worker, handle) in handles {
        debug!(%worker, "joining worker");
        if handle.join().is_err() {
            error!(%worker, "worker panicked");
            panicked.get_or_insert(worker);
        }
    }
    panicked
}
