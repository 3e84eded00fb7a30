//! Type definitions for the CRM SDK.

pub mod credentials;
pub mod error;
pub mod record;
pub mod results;

// Re-export commonly used types
pub use credentials::Credentials;
pub use error::{Error, Result};
pub use record::{Contact, SObject, SObjectRecord};
pub use results::{DeleteResult, LoginResult, QueryResult, RemoteError, SaveResult};
