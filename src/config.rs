// Process-level configuration assembled from HOTEL_AGGR_* environment variables

use std::{str::FromStr, time::Duration};

use thiserror::Error;

use crate::{admission::LimiterConfig, aggregator::AggregatorConfig, cache::CacheConfig};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{key} must not exceed {max_secs} seconds")]
    TooLarge { key: &'static str, max_secs: u64 },
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub aggregator: AggregatorConfig,
    pub cache: CacheConfig,
    pub limiter: LimiterConfig,
}

pub const PROVIDER_TIMEOUT_MS: &str = "HOTEL_AGGR_PROVIDER_TIMEOUT_MS";
pub const CACHE_TTL_SECS: &str = "HOTEL_AGGR_CACHE_TTL_SECS";
pub const CACHE_CLEANUP_SECS: &str = "HOTEL_AGGR_CACHE_CLEANUP_SECS";
pub const RATE_LIMIT_CAPACITY: &str = "HOTEL_AGGR_RATE_LIMIT_CAPACITY";
pub const RATE_LIMIT_PERIOD_SECS: &str = "HOTEL_AGGR_RATE_LIMIT_PERIOD_SECS";
pub const RATE_LIMIT_CLEANUP_SECS: &str = "HOTEL_AGGR_RATE_LIMIT_CLEANUP_SECS";
pub const RATE_LIMIT_IDLE_SECS: &str = "HOTEL_AGGR_RATE_LIMIT_IDLE_SECS";

// Upper bound for any configured duration (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ms) = parse::<u64, _>(&lookup, PROVIDER_TIMEOUT_MS)? {
            let ms = bounded(non_zero(ms, PROVIDER_TIMEOUT_MS)?, 1000, PROVIDER_TIMEOUT_MS)?;
            config.aggregator.provider_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, CACHE_TTL_SECS)? {
            config.cache.ttl = Duration::from_secs(bounded(secs, 1, CACHE_TTL_SECS)?);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, CACHE_CLEANUP_SECS)? {
            let secs = bounded(non_zero(secs, CACHE_CLEANUP_SECS)?, 1, CACHE_CLEANUP_SECS)?;
            config.cache.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse::<u32, _>(&lookup, RATE_LIMIT_CAPACITY)? {
            config.limiter.capacity = capacity;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, RATE_LIMIT_PERIOD_SECS)? {
            let secs = bounded(secs, 1, RATE_LIMIT_PERIOD_SECS)?;
            config.limiter.refill_period = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, RATE_LIMIT_CLEANUP_SECS)? {
            let secs = non_zero(secs, RATE_LIMIT_CLEANUP_SECS)?;
            let secs = bounded(secs, 1, RATE_LIMIT_CLEANUP_SECS)?;
            config.limiter.cleanup_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, RATE_LIMIT_IDLE_SECS)? {
            let secs = bounded(secs, 1, RATE_LIMIT_IDLE_SECS)?;
            config.limiter.idle_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

// tokio intervals panic on a zero period
fn non_zero(value: u64, key: &'static str) -> Result<u64, ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(key))
    } else {
        Ok(value)
    }
}

// `value` is in units of 1/`per_sec` seconds
fn bounded(value: u64, per_sec: u64, key: &'static str) -> Result<u64, ConfigError> {
    if value / per_sec > MAX_DURATION_SECS {
        Err(ConfigError::TooLarge {
            key,
            max_secs: MAX_DURATION_SECS,
        })
    } else {
        Ok(value)
    }
}
