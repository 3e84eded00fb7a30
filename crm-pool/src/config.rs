//! Pool configuration.

use std::env;
use std::time::Duration;

use crm_sdk::Credentials;

use crate::error::{PoolError, Result};

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_SESSION_AGE: Duration = Duration::from_secs(60 * 60);

pub const ENV_USERNAME: &str = "CRM_USERNAME";
pub const ENV_PASSWORD: &str = "CRM_PASSWORD";
pub const ENV_CAPACITY: &str = "CRM_POOL_CAPACITY";
pub const ENV_ACQUIRE_TIMEOUT_MS: &str = "CRM_POOL_ACQUIRE_TIMEOUT_MS";
pub const ENV_RETRY_INTERVAL_MS: &str = "CRM_POOL_RETRY_INTERVAL_MS";
pub const ENV_MAX_SESSION_AGE_SECS: &str = "CRM_POOL_MAX_SESSION_AGE_SECS";

/// Configuration for the session pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Most sessions alive at once, idle and checked out together.
    pub capacity: usize,
    /// How long `acquire` waits for a free slot before giving up.
    pub acquire_timeout: Duration,
    /// Pause between attempts while the pool is saturated.
    pub retry_interval: Duration,
    /// Idle sessions older than this are logged out and replaced on acquire.
    pub max_session_age: Duration,
    pub credentials: Credentials,
}

impl PoolConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_session_age: DEFAULT_MAX_SESSION_AGE,
            credentials,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_max_session_age(mut self, age: Duration) -> Self {
        self.max_session_age = age;
        self
    }

    /// Read the configuration from `CRM_*` environment variables.
    ///
    /// `CRM_USERNAME`, `CRM_PASSWORD`, `CRM_POOL_CAPACITY` and
    /// `CRM_POOL_ACQUIRE_TIMEOUT_MS` are required; the retry interval and maximum
    /// session age fall back to their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| PoolError::Config(format!("{} is not set", key)))
        };

        let credentials = Credentials::new(required(ENV_USERNAME)?, required(ENV_PASSWORD)?);
        let mut config = Self::new(credentials)
            .with_capacity(parse_number(ENV_CAPACITY, &required(ENV_CAPACITY)?)? as usize)
            .with_acquire_timeout(Duration::from_millis(parse_number(
                ENV_ACQUIRE_TIMEOUT_MS,
                &required(ENV_ACQUIRE_TIMEOUT_MS)?,
            )?));

        if let Some(raw) = lookup(ENV_RETRY_INTERVAL_MS) {
            config.retry_interval = Duration::from_millis(parse_number(ENV_RETRY_INTERVAL_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_MAX_SESSION_AGE_SECS) {
            config.max_session_age = Duration::from_secs(parse_number(ENV_MAX_SESSION_AGE_SECS, &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PoolError::Config("capacity must be at least 1".to_string()));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::Config("acquire timeout must be positive".to_string()));
        }
        if self.retry_interval.is_zero() {
            return Err(PoolError::Config("retry interval must be positive".to_string()));
        }
        if self.max_session_age.is_zero() {
            return Err(PoolError::Config("max session age must be positive".to_string()));
        }
        if self.credentials.username.is_empty() {
            return Err(PoolError::Config("username must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        PoolError::Config(format!("{} must be a non-negative integer, got '{}'", key, raw))
    })
}
