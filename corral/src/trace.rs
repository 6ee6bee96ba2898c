//! Internal tracing for corral.
//!
//! Enable with `--features tracing`. Without the feature every macro in this
//! module expands to nothing, so the wait/wake paths of the buffer carry no
//! logging cost.
//!
//! This is separate from the diagnostic event stream in
//! [`crate::workload::event`]: tracing describes *how* the buffer and driver
//! behave (waits, wakes, shutdown), events describe *what* the workers did.

/// Default filter used when `RUST_LOG` is not set.
#[cfg(feature = "tracing")]
const DEFAULT_FILTER: &str = "corral=debug";

/// Installs a global subscriber that writes to stderr.
///
/// Worker threads are named (`producer-1`, `consumer-2`, ...), so thread
/// names are included in every line. Calling this twice is harmless; the
/// second installation is ignored.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! disabled {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as warn;
