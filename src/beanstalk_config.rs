//! Beanstalk application configuration.
//!
//! Unique responsibility: load the settings shared by every environment of one
//! application (name, synchronize timeout, version retention, poll schedule)
//! from environment variables.
//!
//! In local dev, `.env` is loaded from the current directory when present.

use std::{env, str::FromStr, time::Duration};

use thiserror::Error;

use crate::beanstalk_waiter::BackoffSchedule;

/// Configuration for one Elastic Beanstalk application.
#[derive(Clone, Debug)]
pub struct BeanstalkConfig {
    /// Application name.
    /// Env: `BEANSTALK_APPLICATION` (required)
    pub application_name: String,

    /// Default timeout for `synchronize_update`, in seconds.
    /// Env: `BEANSTALK_SYNC_TIMEOUT_SECS` (default: 600)
    pub sync_timeout_secs: u64,

    /// Number of application versions kept by `cleanup_versions`.
    /// Env: `BEANSTALK_KEEP_VERSIONS` (default: 100)
    pub keep_versions: usize,

    /// First delay between two status polls, in seconds.
    /// Env: `BEANSTALK_POLL_INITIAL_SECS` (default: 30, must be at least 1)
    pub poll_initial_secs: u64,

    /// Upper bound for the delay between two status polls, in seconds.
    /// Env: `BEANSTALK_POLL_MAX_SECS` (default: 120, must be at least 1)
    pub poll_max_secs: u64,
}

impl BeanstalkConfig {
    /// Build a configuration with default timings for the given application.
    #[must_use]
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            sync_timeout_secs: 600,
            keep_versions: 100,
            poll_initial_secs: 30,
            poll_max_secs: 120,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let keep_versions = parse_u64_env("BEANSTALK_KEEP_VERSIONS", 100)?;

        Ok(Self {
            application_name: must_env("BEANSTALK_APPLICATION")?,
            sync_timeout_secs: parse_u64_env("BEANSTALK_SYNC_TIMEOUT_SECS", 600)?,
            keep_versions: usize::try_from(keep_versions).map_err(|_| ConfigError::InvalidEnv {
                key: "BEANSTALK_KEEP_VERSIONS",
                value: keep_versions.to_string(),
                reason: "value does not fit in usize",
            })?,
            poll_initial_secs: require_positive(
                "BEANSTALK_POLL_INITIAL_SECS",
                parse_u64_env("BEANSTALK_POLL_INITIAL_SECS", 30)?,
            )?,
            poll_max_secs: require_positive(
                "BEANSTALK_POLL_MAX_SECS",
                parse_u64_env("BEANSTALK_POLL_MAX_SECS", 120)?,
            )?,
        })
    }

    /// Default synchronize timeout as a `Duration`.
    #[must_use]
    pub const fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    /// Poll schedule described by this configuration.
    #[must_use]
    pub const fn backoff(&self) -> BackoffSchedule {
        BackoffSchedule::new(
            Duration::from_secs(self.poll_initial_secs),
            Duration::from_secs(self.poll_max_secs),
        )
    }
}

/// Error raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("missing required env var: {0}")]
    MissingEnv(&'static str),
    /// Invalid environment variable value.
    #[error("invalid env var {key}={value:?}: {reason}")]
    InvalidEnv {
        /// The environment variable key.
        key: &'static str,
        /// The environment variable value.
        value: String,
        /// The reason for invalidity.
        reason: &'static str,
    },
}

pub(crate) fn must_env(key: &'static str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingEnv(key))
}

pub(crate) fn parse_u64_env(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    env::var(key).map_or_else(|_| Ok(default), |v| parse_unsigned(key, v))
}

pub(crate) fn parse_u32_env(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    env::var(key).map_or_else(|_| Ok(default), |v| parse_unsigned(key, v))
}

fn parse_unsigned<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw,
        reason: "expected an unsigned integer",
    })
}

/// A zero poll delay would hammer the API until the deadline.
fn require_positive(key: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidEnv {
            key,
            value: value.to_string(),
            reason: "must be at least 1",
        });
    }
    Ok(value)
}
