//! CRM SDK - Rust client for a record-oriented CRM service
//!
//! This crate provides the remote call contract, wire types, and an authenticated
//! [`RemoteSession`] that runs queries, saves and deletes against the service while
//! respecting its per-call object limit.
//!
//! # Features
//!
//! - **Typed records**: any `serde` type implementing [`SObject`] can be queried and saved
//! - **Async**: built on tokio; the remote contract is an `async_trait`
//! - **Batching**: bulk saves and deletes are split into chunks of [`MAX_BATCH_SIZE`]
//! - **Aggregated errors**: per-item rejections are reported together, with their index
//! - **Offline backend**: [`InMemoryCrm`] implements the contract in process
//!
//! # Example
//!
//! ```rust
//! use crm_sdk::internal::partition;
//!
//! let ids: Vec<u32> = (0..450).collect();
//! let sizes: Vec<usize> = partition(&ids, 200).map(|c| c.len()).collect();
//! assert_eq!(sizes, vec![200, 200, 50]);
//! ```
//!
//! # Modules
//!
//! - [`types`] - Records, wire results, credentials and errors
//! - [`internal`] - Partitioning, error aggregation and transports
//! - [`session`] - Authenticated remote session

pub mod internal;
pub mod session;
pub mod types;

// Re-export all public types at the crate root for convenience
pub use internal::transport::{CallRecord, InMemoryCrm, RemoteApi, RemoteApiFactory};
pub use internal::MAX_BATCH_SIZE;
pub use session::{RemoteSession, SessionId};
pub use types::*;
