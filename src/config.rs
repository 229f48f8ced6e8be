use crate::store::{POSTS_COLLECTION, StoreSettings, TtlEnforcement};
use std::{env, fmt::Display, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::info;

/// Longest accepted post TTL: 100 years.
pub const MAX_POST_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key} value `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bucket_capacity: usize,
    pub display_limit: usize,
    pub post_ttl_secs: u64,
    pub ttl_enforcement: TtlEnforcement,
    /// 0 disables the background sweeper.
    pub sweep_interval_secs: u64,
    pub store_timeout_ms: u64,
    pub default_list_limit: usize,
    pub max_list_limit: usize,
    pub max_concurrent_requests: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            bucket_capacity: 4,
            display_limit: 4,
            post_ttl_secs: 24 * 60 * 60,
            ttl_enforcement: TtlEnforcement::SweepOnWrite,
            sweep_interval_secs: 0,
            store_timeout_ms: 5000,
            default_list_limit: 100,
            max_list_limit: 500,
            max_concurrent_requests: 1024,
        }
    }
}

impl Config {
    /// Load from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            bucket_capacity: try_load(&lookup, "BUCKET_CAPACITY", defaults.bucket_capacity)?,
            display_limit: try_load(&lookup, "DISPLAY_LIMIT", defaults.display_limit)?,
            post_ttl_secs: try_load(&lookup, "POST_TTL_SECS", defaults.post_ttl_secs)?,
            ttl_enforcement: try_load(&lookup, "TTL_ENFORCEMENT", defaults.ttl_enforcement)?,
            sweep_interval_secs: try_load(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            )?,
            store_timeout_ms: try_load(&lookup, "STORE_TIMEOUT_MS", defaults.store_timeout_ms)?,
            default_list_limit: try_load(
                &lookup,
                "DEFAULT_LIST_LIMIT",
                defaults.default_list_limit,
            )?,
            max_list_limit: try_load(&lookup, "MAX_LIST_LIMIT", defaults.max_list_limit)?,
            max_concurrent_requests: try_load(
                &lookup,
                "MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        at_least_one("BUCKET_CAPACITY", self.bucket_capacity as u64)?;
        at_least_one("DISPLAY_LIMIT", self.display_limit as u64)?;
        at_least_one("POST_TTL_SECS", self.post_ttl_secs)?;
        if self.post_ttl_secs > MAX_POST_TTL_SECS {
            return Err(ConfigError::Invalid {
                key: "POST_TTL_SECS",
                value: self.post_ttl_secs.to_string(),
                reason: format!("exceeds {MAX_POST_TTL_SECS} (100 years)"),
            });
        }
        at_least_one("STORE_TIMEOUT_MS", self.store_timeout_ms)?;
        at_least_one("MAX_LIST_LIMIT", self.max_list_limit as u64)?;
        at_least_one("MAX_CONCURRENT_REQUESTS", self.max_concurrent_requests as u64)?;

        if self.default_list_limit > self.max_list_limit {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_LIST_LIMIT",
                value: self.default_list_limit.to_string(),
                reason: format!("exceeds MAX_LIST_LIMIT ({})", self.max_list_limit),
            });
        }
        Ok(())
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            collection: POSTS_COLLECTION.to_string(),
            capacity: self.bucket_capacity,
            ttl: ttl_from_secs(self.post_ttl_secs),
            display_limit: self.display_limit,
            ttl_enforcement: self.ttl_enforcement,
            timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    /// Background sweep period, if one should run. Filtering on read never
    /// deletes by age, so no sweeper runs in that mode.
    pub fn sweep_interval(&self) -> Option<Duration> {
        match (self.ttl_enforcement, self.sweep_interval_secs) {
            (TtlEnforcement::SweepOnWrite, secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => None,
        }
    }

    /// Clamp a requested list size into `1..=max_list_limit`.
    pub fn list_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_list_limit)
            .clamp(1, self.max_list_limit)
    }
}

/// Saturates instead of panicking for TTLs beyond chrono's range.
fn ttl_from_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

fn try_load<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

fn at_least_one(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
