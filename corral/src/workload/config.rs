//! Simulation configuration and command-line parsing.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::sync::ZeroCapacity;

/// Default buffer capacity.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default number of producer and consumer threads.
pub const DEFAULT_WORKERS: usize = 2;

/// Default quota per producer and per consumer.
pub const DEFAULT_ITEMS_PER_WORKER: usize = 5;

/// Default simulated processing time after each push.
pub const DEFAULT_PRODUCER_DELAY: Duration = Duration::from_millis(200);

/// Default simulated processing time after each pop.
pub const DEFAULT_CONSUMER_DELAY: Duration = Duration::from_millis(300);

/// Error building a [`SimulationConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing value for {flag}")]
    MissingValue { flag: String },
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
    #[error("invalid capacity: {0}")]
    Capacity(#[from] ZeroCapacity),
}

/// Everything the driver needs to set up a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    /// Buffer capacity.
    pub capacity: usize,
    /// Number of producer threads.
    pub producers: usize,
    /// Number of consumer threads.
    pub consumers: usize,
    /// Quota of every producer.
    pub items_per_producer: usize,
    /// Quota of every consumer.
    pub items_per_consumer: usize,
    /// Sleep after each push, taken with the lock released.
    pub producer_delay: Duration,
    /// Sleep after each pop, taken with the lock released.
    pub consumer_delay: Duration,
    /// Base seed for item generation. `None` seeds every producer from entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            producers: DEFAULT_WORKERS,
            consumers: DEFAULT_WORKERS,
            items_per_producer: DEFAULT_ITEMS_PER_WORKER,
            items_per_consumer: DEFAULT_ITEMS_PER_WORKER,
            producer_delay: DEFAULT_PRODUCER_DELAY,
            consumer_delay: DEFAULT_CONSUMER_DELAY,
            seed: None,
        }
    }
}

/// Result of parsing the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedArgs {
    Run(SimulationConfig),
    Help,
}

impl SimulationConfig {
    /// Parses command-line arguments (without the program name) on top of
    /// the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unknown flags, missing or malformed
    /// values, and a zero capacity.
    pub fn from_args<I, S>(args: I) -> Result<ParsedArgs, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let flag = arg.as_ref();
            match flag {
                "-c" | "--capacity" => config.capacity = parse_value(flag, args.next())?,
                "-p" | "--producers" => config.producers = parse_value(flag, args.next())?,
                "-C" | "--consumers" => config.consumers = parse_value(flag, args.next())?,
                "--items-per-producer" => {
                    config.items_per_producer = parse_value(flag, args.next())?;
                }
                "--items-per-consumer" => {
                    config.items_per_consumer = parse_value(flag, args.next())?;
                }
                "--producer-delay-ms" => {
                    config.producer_delay = Duration::from_millis(parse_value(flag, args.next())?);
                }
                "--consumer-delay-ms" => {
                    config.consumer_delay = Duration::from_millis(parse_value(flag, args.next())?);
                }
                "--seed" => config.seed = Some(parse_value(flag, args.next())?),
                "-h" | "--help" => return Ok(ParsedArgs::Help),
                other => return Err(ConfigError::UnknownArgument(other.to_owned())),
            }
        }

        config.validate()?;
        Ok(ParsedArgs::Run(config))
    }

    /// Checks the values the buffer cannot work with.
    ///
    /// Zero producers or consumers are allowed; the driver shuts such a run
    /// down as soon as the other side has nothing left to wait for.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Capacity`] if `capacity == 0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ZeroCapacity.into());
        }
        Ok(())
    }

    /// Total items all producers will try to push.
    #[must_use]
    pub const fn total_production(&self) -> usize {
        self.producers * self.items_per_producer
    }

    /// Total items all consumers will try to pop.
    #[must_use]
    pub const fn total_consumption(&self) -> usize {
        self.consumers * self.items_per_consumer
    }

    /// Whether producer and consumer quotas add up to the same total.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.total_production() == self.total_consumption()
    }

    /// Seed for the producer with the given 1-based index.
    #[must_use]
    pub fn producer_seed(&self, index: usize) -> Option<u64> {
        self.seed.map(|seed| seed.wrapping_add(index as u64))
    }
}

fn parse_value<T, S>(flag: &str, value: Option<S>) -> Result<T, ConfigError>
where
    T: FromStr,
    S: AsRef<str>,
{
    let value = value.ok_or_else(|| ConfigError::MissingValue {
        flag: flag.to_owned(),
    })?;
    let value = value.as_ref();
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_owned(),
        value: value.to_owned(),
    })
}
