//! In-process CRM backend.
//!
//! [`InMemoryCrm`] implements the remote contract against a record store held in
//! memory. It supports paging, id assignment and a handful of failure switches, and
//! keeps a log of every call so callers can assert on round trips.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::base::{RemoteApi, RemoteApiFactory};
use crate::types::{
    Credentials, DeleteResult, Error, LoginResult, QueryResult, RemoteError, Result,
    SObjectRecord, SaveResult,
};

/// Default number of records per query page.
pub const DEFAULT_PAGE_SIZE: usize = 2000;

const SERVER_URL: &str = "memory://crm/services/data";

/// One remote call as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRecord {
    Login { username: String },
    Query { soql: String },
    QueryMore { query_locator: String },
    Create { sobject_type: String, count: usize },
    Update { sobject_type: String, count: usize },
    Delete { count: usize },
    Logout { session_id: String },
}

struct FieldRejection {
    field: String,
    value: serde_json::Value,
    message: String,
}

struct CrmState {
    credentials: Credentials,
    password_expired: bool,
    page_size: usize,
    records: Vec<SObjectRecord>,
    next_id: u64,
    next_session: u64,
    next_locator: u64,
    active_sessions: HashSet<String>,
    /// Rows not yet returned, with the total size of the query they came from.
    cursors: HashMap<String, (Vec<serde_json::Value>, i64)>,
    rejected_deletes: HashSet<String>,
    field_rejections: Vec<FieldRejection>,
    calls: Vec<CallRecord>,
    logins: usize,
    logouts: usize,
}

impl CrmState {
    fn rejection_for(&self, record: &SObjectRecord) -> Option<RemoteError> {
        self.field_rejections
            .iter()
            .find(|r| record.fields.get(&r.field) == Some(&r.value))
            .map(|r| {
                let mut error = RemoteError::new("FIELD_CUSTOM_VALIDATION_EXCEPTION", &r.message);
                error.fields.push(r.field.clone());
                error
            })
    }

    fn assign_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem{:015}", self.next_id)
    }

    fn page(&mut self, mut rows: Vec<serde_json::Value>, size: i64) -> QueryResult {
        if rows.len() <= self.page_size {
            return QueryResult {
                records: rows,
                done: true,
                query_locator: None,
                size,
            };
        }

        let rest = rows.split_off(self.page_size);
        self.next_locator += 1;
        let locator = format!("mem-cursor-{}", self.next_locator);
        self.cursors.insert(locator.clone(), (rest, size));

        QueryResult {
            records: rows,
            done: false,
            query_locator: Some(locator),
            size,
        }
    }
}

/// Shared in-memory CRM. Clones share the same store.
#[derive(Clone)]
pub struct InMemoryCrm {
    state: Arc<Mutex<CrmState>>,
}

impl InMemoryCrm {
    /// Create a backend that accepts exactly `credentials` at login.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            state: Arc::new(Mutex::new(CrmState {
                credentials,
                password_expired: false,
                page_size: DEFAULT_PAGE_SIZE,
                records: Vec::new(),
                next_id: 0,
                next_session: 0,
                next_locator: 0,
                active_sessions: HashSet::new(),
                cursors: HashMap::new(),
                rejected_deletes: HashSet::new(),
                field_rejections: Vec::new(),
                calls: Vec::new(),
                logins: 0,
                logouts: 0,
            })),
        }
    }

    /// Set how many records each query page holds.
    pub async fn set_page_size(&self, page_size: usize) {
        self.state.lock().await.page_size = page_size.max(1);
    }

    /// Report the password as expired on every subsequent login.
    pub async fn expire_password(&self) {
        self.state.lock().await.password_expired = true;
    }

    /// Reject deletion of `id`.
    pub async fn reject_delete(&self, id: impl Into<String>) {
        self.state.lock().await.rejected_deletes.insert(id.into());
    }

    /// Reject any create/update whose `field` equals `value`.
    pub async fn reject_field_value(
        &self,
        field: impl Into<String>,
        value: impl Into<serde_json::Value>,
        message: impl Into<String>,
    ) {
        self.state.lock().await.field_rejections.push(FieldRejection {
            field: field.into(),
            value: value.into(),
            message: message.into(),
        });
    }

    /// Store a record directly, bypassing the call log. Returns its id.
    pub async fn seed(&self, mut record: SObjectRecord) -> String {
        let mut state = self.state.lock().await;
        let id = match record.id.clone() {
            Some(id) => id,
            None => state.assign_id(),
        };
        record.id = Some(id.clone());
        state.records.push(record);
        id
    }

    /// All stored records of `sobject_type`, in insertion order.
    pub async fn records_of(&self, sobject_type: &str) -> Vec<SObjectRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.sobject_type == sobject_type)
            .cloned()
            .collect()
    }

    pub async fn calls(&self) -> Vec<CallRecord> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn login_count(&self) -> usize {
        self.state.lock().await.logins
    }

    pub async fn logout_count(&self) -> usize {
        self.state.lock().await.logouts
    }

    /// Number of sessions logged in and not yet logged out.
    pub async fn active_session_count(&self) -> usize {
        self.state.lock().await.active_sessions.len()
    }

    /// Open an unauthenticated connection to this backend.
    pub fn connect(&self) -> InMemoryConnection {
        InMemoryConnection {
            crm: self.clone(),
            session_id: None,
        }
    }
}

impl RemoteApiFactory for InMemoryCrm {
    fn create_client(&self) -> Box<dyn RemoteApi> {
        Box::new(self.connect())
    }
}

/// One client connection to an [`InMemoryCrm`].
pub struct InMemoryConnection {
    crm: InMemoryCrm,
    session_id: Option<String>,
}

impl InMemoryConnection {
    async fn authorized(&self) -> Result<tokio::sync::MutexGuard<'_, CrmState>> {
        let state = self.crm.state.lock().await;
        match &self.session_id {
            Some(id) if state.active_sessions.contains(id) => Ok(state),
            _ => Err(Error::Transport("INVALID_SESSION_ID: session expired or invalid".to_string())),
        }
    }
}

#[async_trait]
impl RemoteApi for InMemoryConnection {
    async fn login(&mut self, username: &str, password: &str) -> Result<LoginResult> {
        let mut state = self.crm.state.lock().await;
        state.calls.push(CallRecord::Login {
            username: username.to_string(),
        });

        if state.credentials.username != username || state.credentials.password != password {
            return Err(Error::AuthenticationFailed(
                "INVALID_LOGIN: Invalid username, password, security token; or user locked out."
                    .to_string(),
            ));
        }

        state.next_session += 1;
        state.logins += 1;
        let session_id = format!("mem-session-{}", state.next_session);
        state.active_sessions.insert(session_id.clone());
        debug!("In-memory login issued {}", session_id);

        Ok(LoginResult {
            session_id,
            server_url: SERVER_URL.to_string(),
            password_expired: state.password_expired,
        })
    }

    fn attach(&mut self, _server_url: &str, session_id: &str) {
        self.session_id = Some(session_id.to_string());
    }

    async fn query(&self, soql: &str) -> Result<QueryResult> {
        let mut state = self.authorized().await?;
        state.calls.push(CallRecord::Query {
            soql: soql.to_string(),
        });

        let sobject_type = soql
            .split_whitespace()
            .skip_while(|token| !token.eq_ignore_ascii_case("from"))
            .nth(1)
            .ok_or_else(|| Error::Transport(format!("MALFORMED_QUERY: missing FROM in '{}'", soql)))?;

        let rows = state
            .records
            .iter()
            .filter(|r| r.sobject_type.eq_ignore_ascii_case(sobject_type))
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let size = rows.len() as i64;

        Ok(state.page(rows, size))
    }

    async fn query_more(&self, query_locator: &str) -> Result<QueryResult> {
        let mut state = self.authorized().await?;
        state.calls.push(CallRecord::QueryMore {
            query_locator: query_locator.to_string(),
        });

        let (rows, size) = state.cursors.remove(query_locator).ok_or_else(|| {
            Error::Transport(format!("INVALID_QUERY_LOCATOR: {}", query_locator))
        })?;

        Ok(state.page(rows, size))
    }

    async fn create(&self, records: &[SObjectRecord]) -> Result<Vec<SaveResult>> {
        let mut state = self.authorized().await?;
        state.calls.push(CallRecord::Create {
            sobject_type: records.first().map(|r| r.sobject_type.clone()).unwrap_or_default(),
            count: records.len(),
        });

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            if record.id.is_some() {
                results.push(SaveResult::failed(vec![RemoteError::new(
                    "INVALID_FIELD_FOR_INSERT_UPDATE",
                    "cannot specify Id in an insert call",
                )]));
                continue;
            }
            if let Some(error) = state.rejection_for(record) {
                results.push(SaveResult::failed(vec![error]));
                continue;
            }

            let id = state.assign_id();
            let mut stored = record.clone();
            stored.id = Some(id.clone());
            state.records.push(stored);
            results.push(SaveResult::ok(id));
        }

        Ok(results)
    }

    async fn update(&self, records: &[SObjectRecord]) -> Result<Vec<SaveResult>> {
        let mut state = self.authorized().await?;
        state.calls.push(CallRecord::Update {
            sobject_type: records.first().map(|r| r.sobject_type.clone()).unwrap_or_default(),
            count: records.len(),
        });

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            if let Some(error) = state.rejection_for(record) {
                results.push(SaveResult::failed(vec![error]));
                continue;
            }

            let existing = match record.id.as_deref() {
                Some(id) => state.records.iter_mut().find(|r| r.id.as_deref() == Some(id)),
                None => None,
            };
            match existing {
                Some(stored) => {
                    stored
                        .fields
                        .extend(record.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                    results.push(SaveResult {
                        success: true,
                        id: stored.id.clone(),
                        errors: Vec::new(),
                    });
                }
                None => results.push(SaveResult::failed(vec![RemoteError::new(
                    "ENTITY_IS_DELETED",
                    "entity is deleted",
                )])),
            }
        }

        Ok(results)
    }

    async fn delete(&self, ids: &[String]) -> Result<Vec<DeleteResult>> {
        let mut state = self.authorized().await?;
        state.calls.push(CallRecord::Delete { count: ids.len() });

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if state.rejected_deletes.contains(id) {
                results.push(DeleteResult::failed(
                    id.as_str(),
                    vec![RemoteError::new(
                        "DELETE_FAILED",
                        format!("Your attempt to delete {} could not be completed", id),
                    )],
                ));
                continue;
            }

            match state.records.iter().position(|r| r.id.as_deref() == Some(id.as_str())) {
                Some(index) => {
                    state.records.remove(index);
                    results.push(DeleteResult::ok(id.as_str()));
                }
                None => results.push(DeleteResult::failed(
                    id.as_str(),
                    vec![RemoteError::new("ENTITY_IS_DELETED", "entity is deleted")],
                )),
            }
        }

        Ok(results)
    }

    async fn logout(&mut self) -> Result<()> {
        let session_id = self
            .session_id
            .take()
            .ok_or_else(|| Error::Transport("logout called without a session".to_string()))?;

        let mut state = self.crm.state.lock().await;
        state.calls.push(CallRecord::Logout {
            session_id: session_id.clone(),
        });
        state.active_sessions.remove(&session_id);
        state.logouts += 1;
        Ok(())
    }
}
