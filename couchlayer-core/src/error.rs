//! Error types and result types for document database operations.
//!
//! Every fallible operation in this crate returns a [`CouchResult<T>`]. Callers branch on
//! the variant (or the `is_*` helpers) to tell absence, conflicts, transport failures and
//! aggregated batch failures apart.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Error as SerdeJsonError, Map, Value};
use std::{error::Error as StdError, fmt};
use thiserror::Error;

use crate::action::ActionId;

/// Boxed lower-level cause attached to transport failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Represents all possible errors that can occur when talking to the document database.
#[derive(Error, Debug)]
pub enum CouchError {
    /// A URL could not be composed from the given base, segments and parameters.
    #[error("Malformed URL {url}: {reason}")]
    MalformedUrl { url: String, reason: String },
    /// The request never produced a response (connect, timeout, encoding or protocol failure).
    #[error("{context}: {url}. Reason: {source}")]
    Transport {
        context: String,
        url: String,
        #[source]
        source: BoxError,
    },
    /// The server answered with a status other than the one the operation requires.
    #[error("{context}: {url}. Expected HTTP {expected}, got {info}")]
    StatusMismatch {
        context: String,
        url: String,
        expected: u16,
        info: ErrorInfo,
    },
    /// The requested document, view or database does not exist.
    #[error("Not found: {url}")]
    NotFound { url: String },
    /// One or more actions of a concurrent batch failed.
    #[error(transparent)]
    Batch(#[from] BatchError),
    /// An action did not report an outcome before the batch wait ended.
    #[error("Action {action} on document {document_id} did not complete before the batch wait ended")]
    Incomplete { action: ActionId, document_id: String },
    /// A value could not be converted to or from its wire representation.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The server response violated the protocol (e.g. a missing `ETag` header).
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The transport has been shut down.
    #[error("Transport has been shut down")]
    Closed,
    /// The transport or client could not be constructed.
    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// A specialized `Result` type for document database operations.
pub type CouchResult<T> = Result<T, CouchError>;

impl CouchError {
    /// Wraps a lower-level failure raised while performing a request.
    pub fn transport<E>(context: impl Into<String>, url: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        CouchError::Transport {
            context: context.into(),
            url: url.into(),
            source: source.into(),
        }
    }

    /// Replaces the failure context of a transport error with the caller's own.
    ///
    /// Other variants are returned unchanged.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            CouchError::Transport { url, source, .. } => CouchError::Transport {
                context: context.to_string(),
                url,
                source,
            },
            other => other,
        }
    }

    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CouchError::StatusMismatch { info, .. } => Some(info.status),
            CouchError::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the server rejected a write because the supplied revision was stale.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, CouchError::Transport { .. } | CouchError::Closed)
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, CouchError::Batch(_))
    }
}

impl From<SerdeJsonError> for CouchError {
    fn from(err: SerdeJsonError) -> Self {
        CouchError::Serialization(err.to_string())
    }
}

/// Structured error payload returned by the server, e.g.
/// `{"error": "conflict", "reason": "Document update conflict."}`.
///
/// Fields other than `error` and `reason` are kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            reason: Some(reason.into()),
            extra: Map::new(),
        }
    }

    /// Wraps a body that is not a structured error object (an HTML proxy page, plain text).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            error: None,
            reason: Some(text.into()),
            extra: Map::new(),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, &self.reason) {
            (Some(error), Some(reason)) => write!(f, "{error}: {reason}"),
            (Some(error), None) => write!(f, "{error}"),
            (None, Some(reason)) => write!(f, "{reason}"),
            (None, None) => write!(f, "<no details>"),
        }
    }
}

/// A failed HTTP response: status, reason phrase and the decoded server payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub status: u16,
    pub reason: String,
    pub body: Option<ErrorBody>,
}

impl ErrorInfo {
    pub fn new(status: u16, body: Option<ErrorBody>) -> Self {
        Self {
            status,
            reason: canonical_reason(status).to_string(),
            body,
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} {}", self.status, self.reason)?;
        if let Some(body) = &self.body {
            write!(f, " ({body})")?;
        }
        Ok(())
    }
}

fn canonical_reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown Status")
}

/// Aggregate failure of a concurrent batch. Owns every underlying cause.
#[derive(Debug)]
pub struct BatchError {
    failures: Vec<CouchError>,
}

impl BatchError {
    pub fn new(failures: Vec<CouchError>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[CouchError] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to execute {} actions.", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {failure}")?;
        }
        Ok(())
    }
}

impl StdError for BatchError {}
