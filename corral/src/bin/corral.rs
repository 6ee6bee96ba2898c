//! Producer/consumer simulation over a bounded buffer.
//!
//! # Usage
//!
//! ```sh
//! corral --capacity 10 --producers 2 --consumers 2
//! RUST_LOG=corral=trace cargo run --features tracing -- --capacity 1 -p 8 -C 8
//! ```

use std::sync::Arc;

use corral::workload::config::{ParsedArgs, SimulationConfig};
use corral::workload::event::ConsoleSink;
use corral::{Simulation, SimulationError};

fn main() {
    if let Err(e) = run() {
        eprintln!("corral: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), SimulationError> {
    corral::init_tracing();

    let config = match SimulationConfig::from_args(std::env::args().skip(1))? {
        ParsedArgs::Run(config) => config,
        ParsedArgs::Help => {
            print_usage();
            return Ok(());
        }
    };

    Simulation::new(config)?.run(Arc::new(ConsoleSink))?;
    Ok(())
}

fn print_usage() {
    eprintln!(
        r#"corral - bounded buffer producer/consumer simulation

USAGE:
    corral [OPTIONS]

OPTIONS:
    -c, --capacity <N>              Buffer capacity (default: 10)
    -p, --producers <N>             Producer threads (default: 2)
    -C, --consumers <N>             Consumer threads (default: 2)
        --items-per-producer <N>    Items each producer pushes (default: 5)
        --items-per-consumer <N>    Items each consumer pops (default: 5)
        --producer-delay-ms <MS>    Sleep after each push (default: 200)
        --consumer-delay-ms <MS>    Sleep after each pop (default: 300)
        --seed <N>                  Seed item generation for reproducible output
    -h, --help                      Print this help message

EXAMPLE:
    corral --capacity 1 --producers 8 --consumers 4 --items-per-consumer 10
"#
    );
}
