//! Environment-driven settings shared by the CLI and the bindings.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_REST_SECONDS: u32 = 90;
pub const DEFAULT_AUTH_TTL_HOURS: i64 = 720;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub blob_dir: Option<PathBuf>,
    pub default_rest_seconds: u32,
    pub retry: RetryPolicy,
    pub auth_ttl: TimeDelta,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            blob_dir: None,
            default_rest_seconds: DEFAULT_REST_SECONDS,
            retry: RetryPolicy::default(),
            auth_ttl: TimeDelta::hours(DEFAULT_AUTH_TTL_HOURS),
        }
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Unset keys take their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = RetryPolicy::default();
        let attempts: u32 = parsed(&lookup, "SETWISE_RETRY_ATTEMPTS", defaults.max_attempts)?;
        if attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "SETWISE_RETRY_ATTEMPTS",
                value: "0".into(),
            });
        }
        let base_ms: u64 = parsed(
            &lookup,
            "SETWISE_RETRY_BASE_MS",
            defaults.base_delay.as_millis() as u64,
        )?;
        let ttl_hours: i64 = parsed(&lookup, "SETWISE_AUTH_TTL_HOURS", DEFAULT_AUTH_TTL_HOURS)?;
        let auth_ttl = TimeDelta::try_hours(ttl_hours)
            .filter(|ttl| *ttl > TimeDelta::zero())
            .ok_or(ConfigError::Invalid {
                key: "SETWISE_AUTH_TTL_HOURS",
                value: ttl_hours.to_string(),
            })?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
            blob_dir: lookup("SETWISE_BLOB_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            default_rest_seconds: parsed(
                &lookup,
                "SETWISE_DEFAULT_REST_SECONDS",
                DEFAULT_REST_SECONDS,
            )?,
            retry: RetryPolicy {
                max_attempts: attempts,
                base_delay: Duration::from_millis(base_ms),
                ..defaults
            },
            auth_ttl,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}
