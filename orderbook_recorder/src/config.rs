use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    error::{Error, Result},
    instrument::Instrument,
};

pub const ENV_PREFIX: &str = "RECORDER";

/// Upper bound for periods and the aggregation window: one day.
pub const MAX_PERIOD_MS: u64 = 24 * 60 * 60 * 1_000;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_instruments")]
    pub max_instruments: usize,
    #[serde(default = "default_drain_period_ms")]
    pub drain_period_ms: u64,
    #[serde(default = "default_aggregation_period_ms")]
    pub aggregation_period_ms: u64,
    #[serde(default = "default_aggregation_window_ms")]
    pub aggregation_window_ms: u64,
    #[serde(default = "default_replay_delay_ms")]
    pub replay_delay_ms: u64,
    #[serde(default)]
    pub instruments: Vec<Instrument>,
    #[serde(default = "default_cache_url")]
    pub cache_url: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_raw_schema")]
    pub raw_schema: String,
    #[serde(default = "default_aggregated_schema")]
    pub aggregated_schema: String,
}

fn default_max_instruments() -> usize {
    10
}

fn default_drain_period_ms() -> u64 {
    1_000
}

fn default_aggregation_period_ms() -> u64 {
    60_000
}

fn default_aggregation_window_ms() -> u64 {
    60_000
}

fn default_replay_delay_ms() -> u64 {
    100
}

fn default_cache_url() -> String {
    "redis://127.0.0.1:6379".into()
}

fn default_database_url() -> String {
    "postgres://localhost/tickers".into()
}

fn default_raw_schema() -> String {
    "raw".into()
}

fn default_aggregated_schema() -> String {
    "m1".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_instruments: default_max_instruments(),
            drain_period_ms: default_drain_period_ms(),
            aggregation_period_ms: default_aggregation_period_ms(),
            aggregation_window_ms: default_aggregation_window_ms(),
            replay_delay_ms: default_replay_delay_ms(),
            instruments: Vec::new(),
            cache_url: default_cache_url(),
            database_url: default_database_url(),
            raw_schema: default_raw_schema(),
            aggregated_schema: default_aggregated_schema(),
        }
    }
}

impl Config {
    pub fn drain_period(&self) -> Duration {
        Duration::from_millis(self.drain_period_ms)
    }

    pub fn aggregation_period(&self) -> Duration {
        Duration::from_millis(self.aggregation_period_ms)
    }

    pub fn aggregation_window(&self) -> Duration {
        Duration::from_millis(self.aggregation_window_ms)
    }

    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }

    /// The first `max_instruments` instruments, in listed order.
    pub fn tracked_instruments(&self) -> Vec<Instrument> {
        self.instruments
            .iter()
            .take(self.max_instruments)
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("drain_period_ms", self.drain_period_ms),
            ("aggregation_period_ms", self.aggregation_period_ms),
            ("aggregation_window_ms", self.aggregation_window_ms),
        ] {
            if value == 0 || value > MAX_PERIOD_MS {
                return Err(Error::Config(config::ConfigError::Message(format!(
                    "{} must be in 1..={}, got {}",
                    name, MAX_PERIOD_MS, value
                ))));
            }
        }
        Ok(())
    }
}

/// Loads `source` (any format the `config` crate understands) overlaid with
/// `RECORDER__*` environment variables.
pub fn load_config<T: DeserializeOwned>(source: Option<&str>) -> Result<T> {
    let mut builder = config::Config::builder();
    if let Some(source) = source {
        builder = builder.add_source(config::File::with_name(source));
    }
    Ok(builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<T>()?)
}
