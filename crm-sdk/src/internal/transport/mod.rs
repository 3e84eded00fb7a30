//! Remote transport implementations for the CRM SDK.

mod base;
pub mod memory;

pub use base::{RemoteApi, RemoteApiFactory};
pub use memory::{CallRecord, InMemoryConnection, InMemoryCrm};
