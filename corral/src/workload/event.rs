//! Diagnostic event stream.
//!
//! Workers and the driver describe what happened through [`Event`]s handed to
//! an [`EventSink`]. The stream is informational: ordering between threads is
//! whatever order the sink observes, and the [`Receipt`] attached to each push
//! and pop is the authoritative record of buffer order.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::sync::Receipt;
use crate::workload::{Item, WorkerId};

/// One line of the diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Emitted once before any worker is spawned.
    Started {
        producers: usize,
        consumers: usize,
        capacity: usize,
    },
    /// A producer pushed `item`.
    Produced {
        worker: WorkerId,
        item: Item,
        receipt: Receipt,
    },
    /// A consumer popped `item`.
    Consumed {
        worker: WorkerId,
        item: Item,
        receipt: Receipt,
    },
    /// A worker observed shutdown before reaching its quota.
    Stopped {
        worker: WorkerId,
        completed: usize,
        target: usize,
    },
    /// Emitted once after every worker has been joined.
    Finished {
        produced: u64,
        consumed: u64,
        final_len: usize,
    },
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started {
                producers,
                consumers,
                capacity,
            } => write!(
                f,
                "--- Producer-Consumer Simulation: {producers} producer(s), \
                 {consumers} consumer(s), capacity {capacity} ---"
            ),
            Self::Produced {
                worker,
                item,
                receipt,
            } => write!(
                f,
                "[{worker}]: Produced Item {item}. Buffer size: {}",
                receipt.len
            ),
            Self::Consumed {
                worker,
                item,
                receipt,
            } => write!(
                f,
                "[{worker}]: Consumed Item {item}. Buffer size: {}",
                receipt.len
            ),
            Self::Stopped {
                worker,
                completed,
                target,
            } => write!(
                f,
                "[{worker}]: stopped by shutdown after {completed} of {target} item(s)"
            ),
            Self::Finished {
                produced,
                consumed,
                final_len,
            } => write!(
                f,
                "Simulation finished. Produced {produced}, consumed {consumed}. \
                 Final Buffer Size: {final_len}"
            ),
        }
    }
}

/// Destination for diagnostic events. Shared by every worker thread.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Writes one line per event to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn record(&self, event: &Event) {
        let mut out = io::stdout().lock();
        // A closed stdout must not take the workers down with it.
        let _ = writeln!(out, "{event}");
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_produced_line() {
        let event = Event::Produced {
            worker: WorkerId::producer(1),
            item: 523,
            receipt: Receipt { seq: 0, len: 3 },
        };
        assert_eq!(
            event.to_string(),
            "[Producer 1]: Produced Item 523. Buffer size: 3"
        );
    }

    #[test]
    fn test_consumed_line() {
        let event = Event::Consumed {
            worker: WorkerId::consumer(2),
            item: 101,
            receipt: Receipt { seq: 4, len: 0 },
        };
        assert_eq!(
            event.to_string(),
            "[Consumer 2]: Consumed Item 101. Buffer size: 0"
        );
    }

    #[test]
    fn test_banner_and_summary_lines() {
        let started = Event::Started {
            producers: 2,
            consumers: 3,
            capacity: 10,
        };
        assert_eq!(
            started.to_string(),
            "--- Producer-Consumer Simulation: 2 producer(s), 3 consumer(s), capacity 10 ---"
        );

        let finished = Event::Finished {
            produced: 10,
            consumed: 10,
            final_len: 0,
        };
        assert_eq!(
            finished.to_string(),
            "Simulation finished. Produced 10, consumed 10. Final Buffer Size: 0"
        );
    }

    #[test]
    fn test_stopped_line() {
        let event = Event::Stopped {
            worker: WorkerId::consumer(1),
            completed: 2,
            target: 5,
        };
        assert_eq!(
            event.to_string(),
            "[Consumer 1]: stopped by shutdown after 2 of 5 item(s)"
        );
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        let first = Event::Finished {
            produced: 1,
            consumed: 1,
            final_len: 0,
        };
        let second = Event::Finished {
            produced: 2,
            consumed: 2,
            final_len: 0,
        };
        sink.record(&first);
        sink.record(&second);
        assert_eq!(sink.events(), vec![first, second]);
    }
}
