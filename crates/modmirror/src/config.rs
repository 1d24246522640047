//! Provides the [`Config`](Config) struct, used to read and access the program's configuration
//! from the environment.

use crate::{util, util::LogLevel, APP_PREFIX};
use anyhow::Context;
use log::*;
use serde::Deserialize;

/// The default location for the program store database file.
pub const DEFAULT_STORE_FILE_LOCATION: &str = "modmirror.db";

/// The program configuration, loaded from `MODMIRROR_`-prefixed environment variables.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// The log level to use.
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Config {
    /// Loads the configuration from the environment.
    pub fn from_env() -> anyhow::Result<Config> {
        Ok(envy::prefixed(APP_PREFIX)
            .from_env::<Config>()
            .with_context(|| {
                format!(
                    "Failed to load Config from environment variables.\nConfig env:\n{}",
                    util::dump_env(APP_PREFIX)
                )
            })?)
    }

    /// Logs the current configuration and the environment it came from.
    pub fn debug_values(&self) {
        debug!("{:?}", util::dump_env_lines(APP_PREFIX));
        debug!("{:?}", self);
    }
}
