//! Internal implementation details for the CRM SDK.

pub mod aggregate;
pub mod partition;
pub mod transport;

pub use aggregate::{aggregate_failures, aggregate_failures_at, ItemOutcome};
pub use partition::{partition, MAX_BATCH_SIZE};
