//! Configuration loading and representation.
//!
//! Settings come from `PRICECACHE_*` environment variables with defaults for
//! everything. `Settings` is also deserializable so a host process can embed
//! it in its own configuration file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use pricecache_core::DomainError;
use pricecache_observability::LogConfig;
use pricecache_pricelist::InvalidatorConfig;

use crate::jobs::RetryPolicy;

pub const ENV_PRODUCT_BATCH: &str = "PRICECACHE_PRODUCT_BATCH";
pub const ENV_JOB_DELAY_MS: &str = "PRICECACHE_JOB_DELAY_MS";
pub const ENV_JOB_MAX_ATTEMPTS: &str = "PRICECACHE_JOB_MAX_ATTEMPTS";
pub const ENV_JOB_BACKOFF_MS: &str = "PRICECACHE_JOB_BACKOFF_MS";
pub const ENV_LOG_FORMAT: &str = "PRICECACHE_LOG_FORMAT";
pub const ENV_LOG_LEVEL: &str = "PRICECACHE_LOG_LEVEL";

/// Upper bound for retry backoff of cache jobs.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Longest delay accepted before a submitted job becomes claimable.
pub const MAX_JOB_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Longest retry backoff accepted from configuration.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// How cache update jobs are queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueueConfig {
    /// Delay before a submitted job becomes claimable.
    #[serde(default)]
    pub delay: Duration,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub invalidation: InvalidatorConfig,
    #[serde(default)]
    pub jobs: JobQueueConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary key lookup (env-like).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(batch) = parse::<usize, _>(&lookup, ENV_PRODUCT_BATCH)? {
            settings.invalidation.product_batch = batch;
        }
        if let Some(ms) = parse::<u64, _>(&lookup, ENV_JOB_DELAY_MS)? {
            settings.jobs.delay = Duration::from_millis(ms);
        }

        let max_attempts = parse::<u32, _>(&lookup, ENV_JOB_MAX_ATTEMPTS)?;
        let backoff = parse::<u64, _>(&lookup, ENV_JOB_BACKOFF_MS)?;
        if max_attempts.is_some() || backoff.is_some() {
            let defaults = RetryPolicy::default();
            settings.jobs.retry = RetryPolicy::exponential(
                max_attempts.unwrap_or(defaults.max_attempts),
                backoff.map(Duration::from_millis).unwrap_or(defaults.base_delay),
                MAX_BACKOFF,
            );
        }

        if let Some(format) = parse(&lookup, ENV_LOG_FORMAT)? {
            settings.log.format = format;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL).filter(|l| !l.trim().is_empty()) {
            settings.log.level = level.trim().to_string();
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.invalidation.validate()?;
        self.jobs.validate()
    }
}

impl JobQueueConfig {
    /// Job timestamps are computed as `now + delay`, so delays are bounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_at_most("jobs.delay", self.delay, MAX_JOB_DELAY)?;
        check_at_most("jobs.retry.max_delay", self.retry.max_delay, MAX_RETRY_DELAY)
    }
}

fn check_at_most(key: &'static str, value: Duration, max: Duration) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::Invalid {
            key,
            value: format!("{value:?}"),
            reason: format!("must be at most {max:?}"),
        });
    }
    Ok(())
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}
