//! Core traits and types for document representation and serialization.
//!
//! This module provides the trait that all persisted documents implement, a lightweight
//! [`DocumentRef`] for addressing documents by id, and utilities for converting documents
//! to and from their wire representation.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::{CouchError, CouchResult};

/// Wire field holding the document id.
pub const ID_FIELD: &str = "_id";
/// Wire field holding the document revision.
pub const REV_FIELD: &str = "_rev";

/// Core trait that all documents stored in the database must implement.
///
/// A document is identified by an id that never changes after creation, and carries the
/// revision token most recently observed for it. The revision is `None` until the document
/// has been stored or probed; writes without a fresh revision may be rejected by the server
/// with a conflict.
///
/// # Example
///
/// ```ignore
/// use couchlayer::document::Document;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct User {
///     #[serde(rename = "_id")]
///     pub id: String,
///     #[serde(rename = "_rev", skip_serializing_if = "Option::is_none", default)]
///     pub rev: Option<String>,
///     pub name: String,
/// }
///
/// impl Document for User {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn revision(&self) -> Option<&str> {
///         self.rev.as_deref()
///     }
///
///     fn set_revision(&mut self, revision: Option<String>) {
///         self.rev = revision;
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns this document's unique identifier.
    fn id(&self) -> &str;

    /// Returns the last known revision of this document, if any.
    fn revision(&self) -> Option<&str>;

    /// Records a revision obtained from the server.
    fn set_revision(&mut self, revision: Option<String>);
}

/// Extension trait providing wire conversion utilities for documents.
///
/// This trait is automatically implemented for all types that implement [`Document`].
pub trait DocumentExt: Document {
    /// Converts this document to the JSON object sent to the server.
    ///
    /// The `_id` field is always present; `_rev` is present exactly when the document
    /// carries a known revision.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the document is not a JSON object.
    fn to_wire(&self) -> CouchResult<Value>;

    /// Creates a document from a JSON value received from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_wire(value: Value) -> CouchResult<Self>;
}

impl<D: Document> DocumentExt for D {
    fn to_wire(&self) -> CouchResult<Value> {
        let mut value = to_value(self)?;
        let object = value.as_object_mut().ok_or_else(|| {
            CouchError::Serialization(format!(
                "Document {} must serialize to a JSON object",
                self.id()
            ))
        })?;

        object
            .entry(ID_FIELD)
            .or_insert_with(|| Value::String(self.id().to_string()));

        match self.revision() {
            Some(rev) => {
                object.insert(REV_FIELD.to_string(), Value::String(rev.to_string()));
            }
            None => {
                object.remove(REV_FIELD);
            }
        }

        Ok(value)
    }

    fn from_wire(value: Value) -> CouchResult<Self> {
        Ok(from_value(value)?)
    }
}

/// Reference to a document by id, optionally pinned to a revision.
///
/// Use it to fetch or delete documents whose body the caller does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.rev = Some(revision.into());
        self
    }
}

impl Document for DocumentRef {
    fn id(&self) -> &str {
        &self.id
    }

    fn revision(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_revision(&mut self, revision: Option<String>) {
        self.rev = revision;
    }
}

impl From<&str> for DocumentRef {
    fn from(id: &str) -> Self {
        DocumentRef::new(id)
    }
}

impl From<String> for DocumentRef {
    fn from(id: String) -> Self {
        DocumentRef::new(id)
    }
}

impl From<&String> for DocumentRef {
    fn from(id: &String) -> Self {
        DocumentRef::new(id.as_str())
    }
}

/// Response body of a successful write: `{"ok": true, "id": "...", "rev": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
}
