//! Units of pending work against one document, and the report a batch produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt};
use uuid::Uuid;

use crate::{
    document::{Document, DocumentExt},
    error::{BatchError, CouchError, CouchResult},
};

/// Identity of an action within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Store { skip_if_exists: bool },
    Delete,
}

/// A pending store or delete of one document.
///
/// The action holds a snapshot of what it needs (id, revision and, for stores, the wire
/// body), so it can run on another task without borrowing the caller's document.
#[derive(Debug, Clone)]
pub struct Action {
    id: ActionId,
    kind: ActionKind,
    document_id: String,
    revision: Option<String>,
    body: Option<Value>,
}

impl Action {
    /// Creates a store action from the document's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be converted to its wire form.
    pub fn store<D: Document>(doc: &D, skip_if_exists: bool) -> CouchResult<Self> {
        Ok(Self {
            id: ActionId::new(),
            kind: ActionKind::Store { skip_if_exists },
            document_id: doc.id().to_string(),
            revision: doc.revision().map(str::to_string),
            body: Some(doc.to_wire()?),
        })
    }

    /// Creates a delete action. The document's revision makes the delete conditional.
    pub fn delete<D: Document>(doc: &D) -> Self {
        Self {
            id: ActionId::new(),
            kind: ActionKind::Delete,
            document_id: doc.id().to_string(),
            revision: doc.revision().map(str::to_string),
            body: None,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn skip_if_exists(&self) -> bool {
        matches!(self.kind, ActionKind::Store { skip_if_exists: true })
    }
}

/// What a successful action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Stored {
        document_id: String,
        revision: Option<String>,
    },
    Deleted {
        document_id: String,
    },
    /// Nothing was sent: the document already existed (skip-if-exists store) or was
    /// already gone (delete).
    Skipped {
        document_id: String,
    },
}

impl ActionOutcome {
    pub fn document_id(&self) -> &str {
        match self {
            ActionOutcome::Stored { document_id, .. }
            | ActionOutcome::Deleted { document_id }
            | ActionOutcome::Skipped { document_id } => document_id,
        }
    }
}

/// Result of one batch: the outcome of every action that succeeded and every failure.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: HashMap<ActionId, ActionOutcome>,
    pub failures: Vec<CouchError>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self, id: &ActionId) -> Option<&ActionOutcome> {
        self.outcomes.get(id)
    }

    /// Fails with one [`CouchError::Batch`] owning every failure, if there were any.
    pub fn into_result(self) -> CouchResult<HashMap<ActionId, ActionOutcome>> {
        if self.failures.is_empty() {
            Ok(self.outcomes)
        } else {
            Err(BatchError::new(self.failures).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentRef;
    use serde_json::json;

    #[test]
    fn store_action_snapshots_the_wire_body() {
        let doc = DocumentRef::new("a").with_revision("1-x");
        let action = Action::store(&doc, true).unwrap();
        assert!(action.skip_if_exists());
        assert_eq!(action.revision(), Some("1-x"));
        assert_eq!(action.body(), Some(&json!({ "_id": "a", "_rev": "1-x" })));
    }

    #[test]
    fn action_ids_are_unique() {
        let doc = DocumentRef::new("a");
        assert_ne!(Action::delete(&doc).id(), Action::delete(&doc).id());
    }

    #[test]
    fn report_with_failures_becomes_one_batch_error() {
        let report = BatchReport {
            outcomes: HashMap::new(),
            failures: vec![
                CouchError::Protocol("one".into()),
                CouchError::Protocol("two".into()),
            ],
        };
        match report.into_result() {
            Err(CouchError::Batch(batch)) => assert_eq!(batch.len(), 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
