//! Remote API trait for CRM communication.

use async_trait::async_trait;

use crate::types::{DeleteResult, LoginResult, QueryResult, Result, SObjectRecord, SaveResult};

/// Abstract client for the remote CRM service.
///
/// This is the low-level call surface (SOAP, REST, or an in-process fake). The
/// [`RemoteSession`](crate::RemoteSession) builds login handling, pagination, batching
/// and error aggregation on top of it. Every method is one remote round trip; failures
/// of the call itself surface as [`Error::Transport`](crate::Error::Transport).
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Authenticate with username and password.
    ///
    /// Rejected credentials are reported as
    /// [`Error::AuthenticationFailed`](crate::Error::AuthenticationFailed).
    async fn login(&mut self, username: &str, password: &str) -> Result<LoginResult>;

    /// Point subsequent calls at `server_url`, authenticated by `session_id`.
    fn attach(&mut self, server_url: &str, session_id: &str);

    /// Run a query and return its first page.
    async fn query(&self, soql: &str) -> Result<QueryResult>;

    /// Fetch the page following `query_locator`. Each locator is single use.
    async fn query_more(&self, query_locator: &str) -> Result<QueryResult>;

    /// Create records; results come back in input order.
    async fn create(&self, records: &[SObjectRecord]) -> Result<Vec<SaveResult>>;

    /// Update records by id; results come back in input order.
    async fn update(&self, records: &[SObjectRecord]) -> Result<Vec<SaveResult>>;

    /// Delete records by id; results come back in input order.
    async fn delete(&self, ids: &[String]) -> Result<Vec<DeleteResult>>;

    /// Terminate the remote session.
    async fn logout(&mut self) -> Result<()>;
}

/// Produces fresh, unauthenticated clients, one per session.
pub trait RemoteApiFactory: Send + Sync {
    fn create_client(&self) -> Box<dyn RemoteApi>;
}
