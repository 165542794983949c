//! Typed records of a database change feed (`GET <db>/_changes`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One revision listed for a changed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRevision {
    pub rev: String,
}

/// One entry of the change feed.
///
/// `seq` is kept as raw JSON: servers use both integer and opaque string sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub seq: Value,
    pub id: String,
    #[serde(default)]
    pub changes: Vec<ChangeRevision>,
    #[serde(default)]
    pub deleted: bool,
}

impl DocumentChange {
    pub fn revisions(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|change| change.rev.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default)]
    pub results: Vec<DocumentChange>,
    #[serde(default)]
    pub last_seq: Value,
}

impl ChangeSet {
    /// Sequence to pass as `since` to continue reading after this set, as a query value.
    pub fn next_since(&self) -> Option<String> {
        match &self.last_seq {
            Value::Null => None,
            Value::String(seq) => Some(seq.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_change_feed() {
        let set: ChangeSet = serde_json::from_value(json!({
            "results": [
                { "seq": 1, "id": "a", "changes": [ { "rev": "1-x" } ] },
                { "seq": 2, "id": "b", "changes": [ { "rev": "2-y" } ], "deleted": true }
            ],
            "last_seq": 2
        }))
        .unwrap();

        assert_eq!(set.len(), 2);
        assert!(!set.results[0].deleted);
        assert!(set.results[1].deleted);
        assert_eq!(set.results[1].revisions().collect::<Vec<_>>(), vec!["2-y"]);
        assert_eq!(set.next_since().as_deref(), Some("2"));
    }

    #[test]
    fn opaque_sequences_pass_through() {
        let set: ChangeSet =
            serde_json::from_value(json!({ "results": [], "last_seq": "7-g1AAAA" })).unwrap();
        assert_eq!(set.next_since().as_deref(), Some("7-g1AAAA"));
    }
}
