use std::time::Duration;

use thiserror::Error;

/// Errors raised by the session pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Every slot stayed checked out until the deadline passed.
    #[error("connection pool timed out after waiting {0:?}")]
    Timeout(Duration),

    /// Missing or malformed pool settings.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// Opening a new session failed.
    #[error(transparent)]
    Sdk(#[from] crm_sdk::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;
