//! Authenticated session against the remote CRM service.

use std::fmt;
use std::slice;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::internal::transport::RemoteApi;
use crate::internal::{aggregate_failures, aggregate_failures_at, partition, MAX_BATCH_SIZE};
use crate::types::{Credentials, Error, Result, SObject, SaveResult};

/// Identifier the SDK assigns to each session for logging and bookkeeping.
pub type SessionId = Uuid;

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Create,
    Update,
}

/// One authenticated connection to the remote service.
///
/// A session owns its remote client exclusively; every data operation takes
/// `&mut self`, so a session can only be used by one caller at a time. Sessions are
/// normally obtained from a pool and handed back when the caller is done.
///
/// # Example
///
/// ```rust,no_run
/// use crm_sdk::{Contact, Credentials, InMemoryCrm, RemoteApiFactory, RemoteSession};
///
/// # async fn example() -> crm_sdk::Result<()> {
/// let credentials = Credentials::new("user@example.com", "secret");
/// let crm = InMemoryCrm::new(credentials.clone());
/// let mut session = RemoteSession::connect(crm.create_client(), &credentials).await?;
///
/// let mut contact = Contact::new("Ada", "Lovelace");
/// session.save(&mut contact).await?;
///
/// let contacts: Vec<Contact> = session.query("SELECT Id, LastName FROM Contact").await?;
/// session.logout().await?;
/// # Ok(())
/// # }
/// ```
pub struct RemoteSession {
    id: SessionId,
    created_at: Instant,
    server_url: String,
    api: Box<dyn RemoteApi>,
}

impl RemoteSession {
    /// Log in with `credentials` and bind the returned endpoint to `api`.
    ///
    /// # Errors
    /// Returns [`Error::AuthenticationFailed`] if the credentials are rejected or the
    /// password has expired. Nothing is retried. A login with an expired password is
    /// logged out again before the error is returned.
    pub async fn connect(mut api: Box<dyn RemoteApi>, credentials: &Credentials) -> Result<Self> {
        let id = Uuid::new_v4();
        let created_at = Instant::now();

        debug!("Session {} logging in as {}", id, credentials.username);
        let login = api.login(&credentials.username, &credentials.password).await?;

        api.attach(&login.server_url, &login.session_id);

        if login.password_expired {
            warn!("Password for {} has expired", credentials.username);
            if let Err(e) = api.logout().await {
                warn!("Session {} logout after expired password failed: {}", id, e);
            }
            return Err(Error::AuthenticationFailed("password has expired".to_string()));
        }

        info!("Session {} connected to {}", id, login.server_url);

        Ok(Self {
            id,
            created_at,
            server_url: login.server_url,
            api,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Instant the session was constructed. Never changes afterwards.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time elapsed since construction.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Endpoint returned by the login call.
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Run `soql` and decode every matching record, following pagination to the end.
    ///
    /// Records keep the order the remote service returns them in. The whole result set
    /// is fetched before returning since query locators cannot be replayed.
    pub async fn query<T: DeserializeOwned>(&mut self, soql: &str) -> Result<Vec<T>> {
        debug!("Session {} query: {}", self.id, soql);
        let mut page = self.api.query(soql).await?;

        if page.size <= 0 {
            return Ok(Vec::new());
        }

        // `size` is reported by the remote side; only trust it as far as the first page.
        let mut records = Vec::with_capacity((page.size as usize).min(page.records.len()));
        loop {
            for row in page.records.drain(..) {
                records.push(serde_json::from_value(row)?);
            }

            if page.done {
                break;
            }

            let locator = page.query_locator.take().ok_or_else(|| {
                Error::Protocol("query page is not done but carries no locator".to_string())
            })?;
            page = self.api.query_more(&locator).await?;
        }

        debug!("Session {} query returned {} records", self.id, records.len());
        Ok(records)
    }

    /// Create `record` if it has no identifier yet, update it otherwise.
    ///
    /// On success the identifier assigned (or confirmed) by the remote service is
    /// written back into `record`.
    ///
    /// # Errors
    /// Returns [`Error::RemoteSaveFailed`] with a per-item breakdown if the remote
    /// service rejects the record.
    pub async fn save<'a, T: SObject>(&mut self, record: &'a mut T) -> Result<&'a mut T> {
        let wire = record.to_record()?;
        let results = if record.is_new() {
            self.api.create(slice::from_ref(&wire)).await?
        } else {
            self.api.update(slice::from_ref(&wire)).await?
        };

        if let Some(breakdown) = aggregate_failures(&results, 0) {
            return Err(Error::RemoteSaveFailed(breakdown));
        }

        let id = results
            .into_iter()
            .next()
            .and_then(|result| result.id)
            .ok_or_else(|| Error::Protocol("save returned no record id".to_string()))?;
        record.set_id(Some(id));

        Ok(record)
    }

    /// Save many records, creating new ones and updating existing ones.
    ///
    /// New and existing records are sent separately, in chunks of at most
    /// [`MAX_BATCH_SIZE`], one remote call per chunk. Identifiers are written back
    /// after every successful chunk.
    ///
    /// Stops at the first chunk with a rejected record and returns
    /// [`Error::RemoteBulkSaveFailed`]. Chunks sent before it stay saved remotely and
    /// their records keep the identifiers already written back. Error indices are
    /// positions in `records`.
    pub async fn bulk_save<T: SObject>(&mut self, records: &mut [T]) -> Result<usize> {
        let (new, existing): (Vec<usize>, Vec<usize>) =
            (0..records.len()).partition(|&i| records[i].is_new());

        debug!(
            "Session {} bulk save: {} new, {} existing",
            self.id,
            new.len(),
            existing.len()
        );

        let mut saved = self.write_chunks(records, &new, WriteKind::Create).await?;
        saved += self.write_chunks(records, &existing, WriteKind::Update).await?;

        Ok(saved)
    }

    async fn write_chunks<T: SObject>(
        &mut self,
        records: &mut [T],
        indices: &[usize],
        kind: WriteKind,
    ) -> Result<usize> {
        let mut saved = 0;

        for (chunk_no, chunk) in partition(indices, MAX_BATCH_SIZE).enumerate() {
            let wire = chunk
                .iter()
                .map(|&i| records[i].to_record())
                .collect::<Result<Vec<_>>>()?;

            let results: Vec<SaveResult> = match kind {
                WriteKind::Create => self.api.create(&wire).await?,
                WriteKind::Update => self.api.update(&wire).await?,
            };

            if results.len() != chunk.len() {
                return Err(Error::Protocol(format!(
                    "sent {} records but received {} results",
                    chunk.len(),
                    results.len()
                )));
            }

            if let Some(breakdown) = aggregate_failures_at(chunk.iter().copied().zip(&results)) {
                warn!(
                    "Session {} bulk {:?} chunk {} rejected after {} records saved",
                    self.id, kind, chunk_no, saved
                );
                return Err(Error::RemoteBulkSaveFailed(breakdown));
            }

            for (&i, result) in chunk.iter().zip(results) {
                if let Some(id) = result.id {
                    records[i].set_id(Some(id));
                }
            }

            saved += chunk.len();
        }

        Ok(saved)
    }

    /// Delete records by id, at most [`MAX_BATCH_SIZE`] per remote call.
    ///
    /// Every chunk is sent before results are checked. Returns the number of deleted
    /// records when all succeeded.
    ///
    /// # Errors
    /// Returns [`Error::RemoteDeleteFailed`] if any id in any chunk was rejected; the
    /// breakdown indexes into `ids`.
    pub async fn delete(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut results = Vec::with_capacity(ids.len());
        for chunk in partition(ids, MAX_BATCH_SIZE) {
            results.extend(self.api.delete(chunk).await?);
        }

        if let Some(breakdown) = aggregate_failures(&results, 0) {
            return Err(Error::RemoteDeleteFailed(breakdown));
        }

        debug!("Session {} deleted {} records", self.id, results.len());
        Ok(results.len())
    }

    /// Terminate the remote session. Consumes the session.
    pub async fn logout(mut self) -> Result<()> {
        info!("Session {} logging out after {:?}", self.id, self.age());
        self.api.logout().await
    }
}

impl fmt::Debug for RemoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSession")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("server_url", &self.server_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::transport::{CallRecord, InMemoryCrm, RemoteApiFactory};
    use crate::types::{Contact, DeleteResult, LoginResult, QueryResult, SObjectRecord};
    use async_trait::async_trait;
    use serde_json::json;

    /// Remote side that answers every call with the same canned response.
    #[derive(Default)]
    struct CannedApi {
        page: QueryResult,
        saves: Vec<SaveResult>,
    }

    #[async_trait]
    impl RemoteApi for CannedApi {
        async fn login(&mut self, _username: &str, _password: &str) -> Result<LoginResult> {
            Ok(LoginResult {
                session_id: "canned-session".to_string(),
                server_url: "https://canned.example.com".to_string(),
                password_expired: false,
            })
        }

        fn attach(&mut self, _server_url: &str, _session_id: &str) {}

        async fn query(&self, _soql: &str) -> Result<QueryResult> {
            Ok(self.page.clone())
        }

        async fn query_more(&self, _query_locator: &str) -> Result<QueryResult> {
            Ok(self.page.clone())
        }

        async fn create(&self, _records: &[SObjectRecord]) -> Result<Vec<SaveResult>> {
            Ok(self.saves.clone())
        }

        async fn update(&self, _records: &[SObjectRecord]) -> Result<Vec<SaveResult>> {
            Ok(self.saves.clone())
        }

        async fn delete(&self, _ids: &[String]) -> Result<Vec<DeleteResult>> {
            Ok(Vec::new())
        }

        async fn logout(&mut self) -> Result<()> {
            Ok(())
        }
    }

    async fn canned(api: CannedApi) -> RemoteSession {
        RemoteSession::connect(Box::new(api), &credentials()).await.unwrap()
    }

    fn contact_row(last_name: &str) -> serde_json::Value {
        json!({ "type": "Contact", "Id": "003A", "FirstName": "Ada", "LastName": last_name })
    }

    fn credentials() -> Credentials {
        Credentials::new("user@example.com", "secret")
    }

    async fn session(crm: &InMemoryCrm) -> RemoteSession {
        RemoteSession::connect(crm.create_client(), &credentials())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_rejects_expired_password() {
        let crm = InMemoryCrm::new(credentials());
        crm.expire_password().await;

        let err = RemoteSession::connect(crm.create_client(), &credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(ref m) if m.contains("expired")));
        assert_eq!(crm.login_count().await, 1);
        assert_eq!(crm.logout_count().await, 1);
        assert_eq!(crm.active_session_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_credentials() {
        let crm = InMemoryCrm::new(credentials());
        let err = RemoteSession::connect(crm.create_client(), &Credentials::new("user@example.com", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_created_at_is_fixed() {
        let crm = InMemoryCrm::new(credentials());
        let session = session(&crm).await;
        let created = session.created_at();

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(session.created_at(), created);
        assert!(session.age() >= Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_save_new_record_creates() {
        let crm = InMemoryCrm::new(credentials());
        let mut session = session(&crm).await;
        crm.clear_calls().await;

        let mut contact = Contact::new("Ada", "Lovelace");
        session.save(&mut contact).await.unwrap();

        assert!(contact.id.is_some());
        assert_eq!(
            crm.calls().await,
            vec![CallRecord::Create { sobject_type: "Contact".to_string(), count: 1 }]
        );
    }

    #[tokio::test]
    async fn test_save_existing_record_updates() {
        let crm = InMemoryCrm::new(credentials());
        let id = crm.seed(Contact::new("Ada", "Byron").to_record().unwrap()).await;
        let mut session = session(&crm).await;
        crm.clear_calls().await;

        let mut contact = Contact::new("Ada", "Lovelace").with_id(id.clone());
        session.save(&mut contact).await.unwrap();

        assert_eq!(contact.id.as_deref(), Some(id.as_str()));
        assert_eq!(
            crm.calls().await,
            vec![CallRecord::Update { sobject_type: "Contact".to_string(), count: 1 }]
        );
        assert_eq!(crm.records_of("Contact").await[0].fields["LastName"], "Lovelace");
    }

    #[tokio::test]
    async fn test_save_rejection_reports_breakdown() {
        let crm = InMemoryCrm::new(credentials());
        crm.reject_field_value("LastName", "Invalid", "Last name is blocked").await;
        let mut session = session(&crm).await;

        let mut contact = Contact::new("Bad", "Invalid");
        let err = session.save(&mut contact).await.unwrap_err();

        match err {
            Error::RemoteSaveFailed(breakdown) => {
                assert_eq!(breakdown, "\n\tError 0:\n\t\tLast name is blocked");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(contact.id.is_none());
    }

    #[tokio::test]
    async fn test_query_empty_result() {
        let crm = InMemoryCrm::new(credentials());
        let mut session = session(&crm).await;
        let contacts: Vec<Contact> = session.query("SELECT Id FROM Contact").await.unwrap();
        assert!(contacts.is_empty());
    }

    #[tokio::test]
    async fn test_delete_empty_makes_no_call() {
        let crm = InMemoryCrm::new(credentials());
        let mut session = session(&crm).await;
        crm.clear_calls().await;

        assert_eq!(session.delete(&[]).await.unwrap(), 0);
        assert!(crm.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_logout_consumes_session() {
        let crm = InMemoryCrm::new(credentials());
        let session = session(&crm).await;
        session.logout().await.unwrap();
        assert_eq!(crm.active_session_count().await, 0);
    }

    #[tokio::test]
    async fn test_query_page_without_locator_is_protocol_error() {
        let mut session = canned(CannedApi {
            page: QueryResult {
                records: vec![contact_row("Lovelace")],
                done: false,
                query_locator: None,
                size: 3,
            },
            ..Default::default()
        })
        .await;

        let err = session.query::<Contact>("SELECT Id FROM Contact").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m.contains("no locator")));
    }

    #[tokio::test]
    async fn test_query_ignores_inflated_size() {
        let mut session = canned(CannedApi {
            page: QueryResult {
                records: vec![contact_row("Lovelace")],
                done: true,
                query_locator: None,
                size: i64::MAX,
            },
            ..Default::default()
        })
        .await;

        let contacts: Vec<Contact> = session.query("SELECT Id FROM Contact").await.unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].last_name, "Lovelace");
    }

    #[tokio::test]
    async fn test_save_without_results_is_protocol_error() {
        let mut session = canned(CannedApi::default()).await;

        let mut contact = Contact::new("Ada", "Lovelace");
        let err = session.save(&mut contact).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m.contains("no record id")));
        assert!(contact.id.is_none());
    }

    #[tokio::test]
    async fn test_bulk_save_result_count_mismatch_is_protocol_error() {
        let mut session = canned(CannedApi {
            saves: vec![SaveResult::ok("003A")],
            ..Default::default()
        })
        .await;

        let mut contacts = vec![Contact::new("A", "One"), Contact::new("B", "Two")];
        let err = session.bulk_save(&mut contacts).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ref m) if m == "sent 2 records but received 1 results"));
        assert!(contacts.iter().all(|c| c.id.is_none()));
    }
}
