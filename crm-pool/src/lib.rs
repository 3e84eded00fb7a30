//! Capacity-bounded pool of authenticated CRM sessions.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crm_pool::{PoolConfig, SessionPool};
//! use crm_sdk::{Contact, Credentials, InMemoryCrm};
//!
//! # async fn example() -> crm_pool::Result<()> {
//! let credentials = Credentials::new("user@example.com", "secret");
//! let pool = SessionPool::new(
//!     PoolConfig::new(credentials.clone()).with_capacity(4),
//!     Arc::new(InMemoryCrm::new(credentials)),
//! )?;
//!
//! {
//!     let mut session = pool.acquire(None).await?;
//!     let contacts: Vec<Contact> = session.query("SELECT Id FROM Contact").await?;
//! } // session goes back to the pool here
//!
//! pool.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod pooled;

pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use pool::{PoolStats, SessionPool};
pub use pooled::PooledSession;
