//! Error types for CRM SDK operations.

use thiserror::Error;

/// The main error type for remote session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Credentials were rejected or have expired at login.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A single-record save was rejected by the remote service.
    #[error("save failed with following errors: {0}")]
    RemoteSaveFailed(String),

    /// One chunk of a bulk save contained rejected records.
    #[error("bulk save failed with following errors: {0}")]
    RemoteBulkSaveFailed(String),

    /// One or more ids could not be deleted.
    #[error("delete failed with following errors: {0}")]
    RemoteDeleteFailed(String),

    /// The remote call itself failed (network, HTTP, SOAP fault...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote service answered with something we cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Record encoding/decoding errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for CRM SDK operations.
pub type Result<T> = std::result::Result<T, Error>;
