//! Bounded buffer throughput under heavy contention.
//!
//! Usage:
//!     cargo run --release --bin contention_bench
//!
//! Environment variables:
//!     CAPACITY=1       Buffer capacity (default: 1)
//!     PRODUCERS=8      Producer threads (default: 8)
//!     CONSUMERS=8      Consumer threads (default: 8)
//!     ITEMS=100000     Items per producer; consumers split the total evenly (default: 100000)

use std::env;
use std::sync::Arc;
use std::thread;

use minstant::Instant;

use corral::{BoundedBuffer, Timeout};

const DEFAULT_CAPACITY: usize = 1;
const DEFAULT_PRODUCERS: usize = 8;
const DEFAULT_CONSUMERS: usize = 8;
const DEFAULT_ITEMS: usize = 100_000;

fn env_or(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() {
    let capacity = env_or("CAPACITY", DEFAULT_CAPACITY).max(1);
    let producers = env_or("PRODUCERS", DEFAULT_PRODUCERS).max(1);
    let consumers = env_or("CONSUMERS", DEFAULT_CONSUMERS).max(1);
    let items = env_or("ITEMS", DEFAULT_ITEMS);
    let total = producers * items;

    println!(
        "contention_bench: capacity={capacity} producers={producers} consumers={consumers} items={total}"
    );

    let buffer = Arc::new(BoundedBuffer::<u64>::new(capacity).expect("capacity is at least 1"));

    let start = Instant::now();

    let producer_handles: Vec<_> = (0..producers)
        .map(|p| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..items {
                    let value = (p * items + i) as u64;
                    if buffer.push(value, Timeout::Infinite).is_err() {
                        return;
                    }
                }
            })
        })
        .collect();

    // Split the total so every item is consumed; the first consumers take the remainder.
    let consumer_handles: Vec<_> = (0..consumers)
        .map(|c| {
            let quota = total / consumers + usize::from(c < total % consumers);
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for _ in 0..quota {
                    if buffer.pop(Timeout::Infinite).is_err() {
                        return;
                    }
                }
            })
        })
        .collect();

    for handle in producer_handles {
        handle.join().expect("producer panicked");
    }
    for handle in consumer_handles {
        handle.join().expect("consumer panicked");
    }
    let elapsed = start.elapsed();
    buffer.shutdown();

    let stats = buffer.stats();
    assert_eq!(stats.pushed, total as u64, "lost pushes");
    assert_eq!(stats.popped, total as u64, "lost pops");
    assert!(
        stats.high_water <= capacity,
        "capacity overrun: high water {} > {capacity}",
        stats.high_water
    );

    let secs = elapsed.as_secs_f64();
    println!("  elapsed:    {:.3} s", secs);
    println!("  throughput: {:.0} items/s", total as f64 / secs);
    println!("  high water: {} / {capacity}", stats.high_water);
}
