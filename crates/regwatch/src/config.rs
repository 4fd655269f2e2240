//! Engine configuration.
//!
//! A [`MonitorConfig`] can be built in code, read from the environment, or
//! (with the `toml` feature) parsed from a TOML table:
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use regwatch::MonitorConfig;
//!
//! let config = MonitorConfig::builder()
//!     .poll_interval(Duration::from_millis(250))
//!     .logging(false)
//!     .build()?;
//!
//! // REGWATCH_POLL_INTERVAL_MS=50 REGWATCH_LOGGING=off
//! let config = MonitorConfig::from_env()?;
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `REGWATCH_POLL_INTERVAL_MS` | Dispatch tick interval in milliseconds | `100` |
//! | `REGWATCH_LOGGING` | `1`/`0`, `true`/`false`, `on`/`off`, `yes`/`no` | `true` |

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding the poll interval, in milliseconds.
pub const ENV_POLL_INTERVAL: &str = "REGWATCH_POLL_INTERVAL_MS";

/// Environment variable toggling diagnostic logging.
pub const ENV_LOGGING: &str = "REGWATCH_LOGGING";

/// Default interval between dispatch ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings for a [`Registry`](crate::Registry).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct MonitorConfig {
    #[cfg_attr(feature = "serde", serde(rename = "poll_interval_ms", with = "millis"))]
    poll_interval: Duration,
    logging: bool,
}

impl MonitorConfig {
    /// Starts a builder from the defaults.
    #[must_use]
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Interval between dispatch ticks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether diagnostic logging is enabled.
    #[must_use]
    pub const fn logging(&self) -> bool {
        self.logging
    }

    /// Reads the configuration from the environment, falling back to the
    /// defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a variable is set but unparseable,
    /// or the interval is zero.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();

        if let Some(raw) = read_var(ENV_POLL_INTERVAL)? {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                Error::invalid_config(
                    ENV_POLL_INTERVAL,
                    format!("expected a whole number of milliseconds, got '{raw}'"),
                )
            })?;
            builder = builder.poll_interval(Duration::from_millis(millis));
        }

        if let Some(raw) = read_var(ENV_LOGGING)? {
            builder = builder.logging(parse_flag(ENV_LOGGING, &raw)?);
        }

        builder.build()
    }

    /// Parses a TOML table such as `poll_interval_ms = 50`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the document does not parse or
    /// fails validation.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::invalid_config("toml", e.message()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero poll interval.
    pub fn validate(&self) -> Result<()> {
        validate_interval(self.poll_interval)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            logging: true,
        }
    }
}

pub(crate) fn validate_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(Error::invalid_config(
            "poll_interval",
            "the poll interval must be greater than zero",
        ));
    }
    Ok(())
}

fn read_var(name: &str) -> Result<Option<String>> {
    match env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(Error::invalid_config(name, "value is not valid unicode"))
        }
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(Error::invalid_config(
            name,
            format!("expected a boolean (1/0, true/false, on/off), got '{raw}'"),
        )),
    }
}

/// Fluent builder for [`MonitorConfig`].
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl MonitorConfigBuilder {
    /// Sets the interval between dispatch ticks.
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Enables or disables diagnostic logging.
    pub const fn logging(mut self, enabled: bool) -> Self {
        self.config.logging = enabled;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero poll interval.
    pub fn build(self) -> Result<MonitorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(interval: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(interval.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
