//! End-to-end scenarios for the producer/consumer simulation.
//!
//! Each scenario runs a full [`Simulation`] on real threads and checks the
//! buffer invariants from the recorded events and the final summary.
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=corral=trace cargo test --features tracing --test scenarios -- --nocapture
//! ```

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use corral::workload::config::SimulationConfig;
use corral::workload::event::{Event, EventSink, MemorySink};
use corral::workload::{Exit, Item, Role, WorkerOutcome};
use corral::{Simulation, SimulationError, Summary};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        corral::init_tracing();
    });
}

/// Upper bound for any scenario; a run that exceeds it is treated as deadlocked.
const DEADLINE: Duration = Duration::from_secs(20);

fn config(
    capacity: usize,
    producers: usize,
    items_per_producer: usize,
    consumers: usize,
    items_per_consumer: usize,
) -> SimulationConfig {
    SimulationConfig {
        capacity,
        producers,
        consumers,
        items_per_producer,
        items_per_consumer,
        producer_delay: Duration::ZERO,
        consumer_delay: Duration::ZERO,
        seed: Some(0x5eed),
    }
}

/// Runs the simulation on a helper thread and fails the test if it does not
/// finish before [`DEADLINE`].
fn run_with_deadline(
    config: SimulationConfig,
    sink: Arc<dyn EventSink>,
) -> Result<Summary, SimulationError> {
    init_test_tracing();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = Simulation::new(config).and_then(|simulation| simulation.run(sink));
        let _ = tx.send(result);
    });
    rx.recv_timeout(DEADLINE)
        .expect("simulation did not terminate: deadlock")
}

/// Push and pop records keyed by receipt sequence number.
#[derive(Default)]
struct Ledger {
    pushed: BTreeMap<u64, Item>,
    popped: BTreeMap<u64, Item>,
    max_len: usize,
}

fn ledger(events: &[Event]) -> Ledger {
    let mut ledger = Ledger::default();
    for event in events {
        match *event {
            Event::Produced { item, receipt, .. } => {
                assert!(ledger.pushed.insert(receipt.seq, item).is_none());
                ledger.max_len = ledger.max_len.max(receipt.len);
            }
            Event::Consumed { item, receipt, .. } => {
                assert!(ledger.popped.insert(receipt.seq, item).is_none());
                ledger.max_len = ledger.max_len.max(receipt.len);
            }
            _ => {}
        }
    }
    ledger
}

#[test]
fn balanced_run_conserves_items() {
    let sink = Arc::new(MemorySink::new());
    let summary = run_with_deadline(config(10, 2, 5, 2, 5), sink.clone()).unwrap();

    assert_eq!(summary.produced, 10);
    assert_eq!(summary.consumed, 10);
    assert_eq!(summary.final_len, 0);
    assert_eq!(summary.stopped_early, 0);
    assert_eq!(summary.outcomes.len(), 4);
    for outcome in &summary.outcomes {
        assert_eq!(outcome.exit, Exit::Done);
        assert_eq!(outcome.completed, 5);
    }

    let ledger = ledger(&sink.events());
    assert_eq!(ledger.pushed.len(), 10);
    assert_eq!(ledger.popped.len(), 10);
}

#[test]
fn pops_follow_push_order() {
    let sink = Arc::new(MemorySink::new());
    let summary = run_with_deadline(config(3, 4, 50, 4, 50), sink.clone()).unwrap();
    assert_eq!(summary.consumed, 200);

    let ledger = ledger(&sink.events());
    assert_eq!(ledger.pushed.len(), 200);
    // Sequence numbers are dense, and the k-th pop returns the k-th push.
    assert_eq!(ledger.pushed.keys().copied().collect::<Vec<_>>(), (0..200).collect::<Vec<_>>());
    assert_eq!(ledger.pushed, ledger.popped);
}

#[test]
fn length_never_exceeds_capacity() {
    let sink = Arc::new(MemorySink::new());
    let summary = run_with_deadline(config(4, 6, 100, 3, 200), sink.clone()).unwrap();

    assert!(summary.high_water <= 4);
    assert!(ledger(&sink.events()).max_len <= 4);
    assert_eq!(summary.produced, 600);
    assert_eq!(summary.consumed, 600);
}

#[test]
fn no_overrun_under_contention() {
    let sink = Arc::new(MemorySink::new());
    let summary = run_with_deadline(config(1, 8, 250, 8, 250), sink.clone()).unwrap();

    assert_eq!(summary.high_water, 1);
    assert_eq!(ledger(&sink.events()).max_len, 1);
    assert_eq!(summary.produced, 2000);
    assert_eq!(summary.consumed, 2000);
    assert_eq!(summary.stopped_early, 0);
}

#[test]
fn terminates_with_simulated_latency() {
    let config = SimulationConfig {
        producer_delay: Duration::from_millis(4),
        consumer_delay: Duration::from_millis(6),
        ..config(10, 2, 5, 2, 5)
    };
    let summary = run_with_deadline(config, Arc::new(MemorySink::new())).unwrap();

    assert_eq!(summary.consumed, 10);
    assert!(summary.elapsed < DEADLINE);
}

#[test]
fn surplus_consumers_stop_once_drained() {
    let summary = run_with_deadline(config(10, 1, 3, 2, 5), Arc::new(MemorySink::new())).unwrap();

    assert_eq!(summary.produced, 3);
    assert_eq!(summary.consumed, 3);
    assert_eq!(summary.final_len, 0);

    let (producers, consumers): (Vec<&WorkerOutcome>, Vec<&WorkerOutcome>) = summary
        .outcomes
        .iter()
        .partition(|outcome| outcome.worker().role == Role::Producer);
    assert!(producers.iter().all(|outcome| outcome.exit == Exit::Done));
    assert!(consumers.iter().all(|outcome| outcome.exit == Exit::Stopped));
    assert_eq!(summary.stopped_early, 2);
}

#[test]
fn surplus_producers_stop_once_consumers_finish() {
    let summary = run_with_deadline(config(2, 2, 5, 1, 3), Arc::new(MemorySink::new())).unwrap();

    assert_eq!(summary.consumed, 3);
    assert!(summary.final_len <= 2);
    assert_eq!(summary.produced, summary.consumed + summary.final_len as u64);

    let consumer = summary
        .outcomes
        .iter()
        .find(|outcome| outcome.worker().role == Role::Consumer)
        .unwrap();
    assert_eq!(consumer.exit, Exit::Done);
    assert!(summary.stopped_early >= 1);
}

#[test]
fn producers_with_room_finish_after_consumers_leave() {
    // The lone consumer is done long before the slow producer, but the
    // buffer never fills, so the producer must not be cut short.
    let config = SimulationConfig {
        producer_delay: Duration::from_millis(20),
        ..config(10, 1, 10, 1, 3)
    };
    let summary = run_with_deadline(config, Arc::new(MemorySink::new())).unwrap();

    assert_eq!(summary.produced, 10);
    assert_eq!(summary.consumed, 3);
    assert_eq!(summary.final_len, 7);
    assert_eq!(summary.stopped_early, 0);
    assert!(summary.outcomes.iter().all(|outcome| outcome.exit == Exit::Done));
}

#[test]
fn producers_without_consumers_stop_once_full() {
    let summary = run_with_deadline(config(3, 2, 5, 0, 0), Arc::new(MemorySink::new())).unwrap();

    assert_eq!(summary.produced, 3);
    assert_eq!(summary.consumed, 0);
    assert_eq!(summary.final_len, 3);
    assert_eq!(summary.stopped_early, 2);
}

#[test]
fn consumers_without_producers_terminate() {
    let summary = run_with_deadline(config(5, 0, 0, 3, 4), Arc::new(MemorySink::new())).unwrap();

    assert_eq!(summary.consumed, 0);
    assert_eq!(summary.stopped_early, 3);
}

#[test]
fn shutdown_after_run_is_a_no_op() {
    init_test_tracing();
    let simulation = Simulation::new(config(10, 2, 5, 2, 5)).unwrap();
    let buffer = Arc::clone(simulation.buffer());

    simulation.run(Arc::new(MemorySink::new())).unwrap();

    assert!(buffer.is_shutdown());
    assert!(!buffer.shutdown());
    assert!(!buffer.shutdown());
    assert_eq!(buffer.len(), 0);
}

/// Panics on the first consumed item.
struct FaultySink;

impl EventSink for FaultySink {
    fn record(&self, event: &Event) {
        if matches!(event, Event::Consumed { .. }) {
            panic!("sink failure");
        }
    }
}

#[test]
fn panicking_worker_is_reported_without_hanging() {
    let err = run_with_deadline(config(2, 2, 5, 1, 10), Arc::new(FaultySink)).unwrap_err();

    match err {
        SimulationError::WorkerPanicked { worker } => assert_eq!(worker.role, Role::Consumer),
        other => panic!("unexpected error: {other}"),
    }
}
