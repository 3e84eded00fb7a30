//! Response types returned by the remote CRM service.

use serde::{Deserialize, Serialize};

/// Result of a successful login call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub session_id: String,
    pub server_url: String,
    #[serde(default)]
    pub password_expired: bool,
}

/// One page of query results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_locator: Option<String>,
    /// Total number of records matched by the query, across all pages.
    pub size: i64,
}

/// Error detail attached to a rejected record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    pub status_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl RemoteError {
    pub fn new(status_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code: status_code.into(),
            message: message.into(),
            fields: Vec::new(),
        }
    }
}

/// Per-record outcome of a create or update call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub errors: Vec<RemoteError>,
}

impl SaveResult {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<RemoteError>) -> Self {
        Self {
            success: false,
            id: None,
            errors,
        }
    }
}

/// Per-id outcome of a delete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub errors: Vec<RemoteError>,
}

impl DeleteResult {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            errors: Vec::new(),
        }
    }

    pub fn failed(id: impl Into<String>, errors: Vec<RemoteError>) -> Self {
        Self {
            success: false,
            id: Some(id.into()),
            errors,
        }
    }
}
