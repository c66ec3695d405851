use std::path::PathBuf;

use config::{Config, ConfigError};
use serde::Deserialize;

pub mod domain;
pub mod infrastructure;

#[derive(Clone, Debug, Deserialize)]
pub struct HallConfig {
    pub storage: Storage,
    pub logger: Logger,
}

impl HallConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("hall")
    }

    /// `name` is a config file path without extension; the file is optional.
    pub fn load_from(name: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("storage.accounts", "data/accounts.txt")?
            .set_default("storage.events", "data/events.txt")?
            .set_default("storage.reservations", "data/reservations.txt")?
            .set_default("storage.sequence", "data/sequence.txt")?
            .set_default("storage.journal", "data/journal.jsonl")?
            .set_default("logger.level", "INFO")?
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("HALL").separator("_"))
            .build()?
            .try_deserialize::<HallConfig>()
    }
}

/// Locations of the persisted tables.
#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
    pub accounts: PathBuf,
    pub events: PathBuf,
    pub reservations: PathBuf,
    pub sequence: PathBuf,
    pub journal: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Logger {
    pub level: Level,
}

#[derive(Clone, Debug, Deserialize)]
pub enum Level {
    TRACE,
    DEBUG,
    INFO,
    WARN,
    ERROR,
}

impl From<&Level> for tracing::Level {
    fn from(value: &Level) -> Self {
        match value {
            Level::TRACE => tracing::Level::TRACE,
            Level::DEBUG => tracing::Level::DEBUG,
            Level::INFO => tracing::Level::INFO,
            Level::WARN => tracing::Level::WARN,
            Level::ERROR => tracing::Level::ERROR,
        }
    }
}
