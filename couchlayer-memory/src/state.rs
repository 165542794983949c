//! Databases and documents held by the in-memory server.
//!
//! Every write checks the supplied revision against the current one the way the real
//! server does: a stale or missing revision is a `409 Conflict`. Deleted documents stay
//! behind as tombstones so their revision history and change-feed entries survive.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use uuid::Uuid;

const ID_FIELD: &str = "_id";
const REV_FIELD: &str = "_rev";
const DESIGN_PREFIX: &str = "_design/";

/// Status, JSON body and optional revision header of an emulated response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reply {
    pub status: u16,
    pub body: Value,
    pub etag: Option<String>,
}

impl Reply {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            etag: None,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn created(body: Value) -> Self {
        Self::new(201, body)
    }

    pub fn error(status: u16, error: &str, reason: impl Into<String>) -> Self {
        Self::new(status, json!({ "error": error, "reason": reason.into() }))
    }

    pub fn not_found(reason: &str) -> Self {
        Self::error(404, "not_found", reason)
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::error(400, "bad_request", reason)
    }

    pub fn conflict() -> Self {
        Self::error(409, "conflict", "Document update conflict.")
    }

    pub fn with_etag(mut self, rev: &str) -> Self {
        self.etag = Some(format!("\"{rev}\""));
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredDocument {
    pub rev: String,
    pub body: Map<String, Value>,
    pub deleted: bool,
    pub seq: u64,
}

impl StoredDocument {
    fn generation(&self) -> u64 {
        generation(&self.rev)
    }

    /// The document as the server returns it: its fields plus `_id` and `_rev`.
    pub fn to_value(&self, id: &str) -> Value {
        let mut value = self.body.clone();
        value.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        value.insert(REV_FIELD.to_string(), Value::String(self.rev.clone()));
        Value::Object(value)
    }
}

fn generation(rev: &str) -> u64 {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
        .unwrap_or(0)
}

fn next_revision(previous: Option<&StoredDocument>) -> String {
    let generation = previous.map_or(0, StoredDocument::generation) + 1;
    format!("{generation}-{}", Uuid::new_v4().simple())
}

/// Whether `name` is a legal database name: a lowercase letter followed by lowercase
/// letters, digits or any of `_$()+-/`.
pub(crate) fn is_valid_database_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(c)
        })
}

pub(crate) fn is_design_id(id: &str) -> bool {
    id.starts_with(DESIGN_PREFIX)
}

#[derive(Debug, Default)]
pub(crate) struct Database {
    pub docs: BTreeMap<String, StoredDocument>,
    pub update_seq: u64,
}

impl Database {
    pub fn info(&self, name: &str) -> Reply {
        let deleted = self.docs.values().filter(|doc| doc.deleted).count();
        Reply::ok(json!({
            "db_name": name,
            "doc_count": self.docs.len() - deleted,
            "doc_del_count": deleted,
            "update_seq": self.update_seq,
        }))
    }

    /// Live (not deleted) document with the given id.
    pub fn live(&self, id: &str) -> Option<&StoredDocument> {
        self.docs.get(id).filter(|doc| !doc.deleted)
    }

    pub fn head(&self, id: &str) -> Reply {
        match self.live(id) {
            Some(doc) => Reply::ok(Value::Null).with_etag(&doc.rev),
            None => Reply::new(404, Value::Null),
        }
    }

    pub fn get(&self, id: &str, rev: Option<&str>) -> Reply {
        match self.docs.get(id) {
            Some(doc) if doc.deleted => Reply::not_found("deleted"),
            Some(doc) if rev.is_some_and(|rev| rev != doc.rev) => Reply::not_found("missing"),
            Some(doc) => Reply::ok(doc.to_value(id)).with_etag(&doc.rev),
            None => Reply::not_found("missing"),
        }
    }

    /// Creates or updates `id`. The revision comes from `rev` or the body's `_rev`.
    pub fn write(&mut self, id: &str, mut body: Map<String, Value>, rev: Option<String>) -> Reply {
        if id.is_empty() {
            return Reply::bad_request("Document id must not be empty");
        }
        if id.starts_with('_') && !is_design_id(id) {
            return Reply::error(
                400,
                "illegal_docid",
                "Only reserved document ids may start with underscore.",
            );
        }

        body.remove(ID_FIELD);
        let body_rev = match body.remove(REV_FIELD) {
            Some(Value::String(rev)) => Some(rev),
            Some(_) => return Reply::bad_request("Invalid rev format"),
            None => None,
        };
        if let Some(field) = body.keys().find(|key| key.starts_with('_')) {
            return Reply::error(
                400,
                "doc_validation",
                format!("Bad special document member: {field}"),
            );
        }

        let rev = rev.or(body_rev);
        let previous = self.docs.get(id);
        let accepted = match previous {
            Some(doc) if !doc.deleted => rev.as_deref() == Some(doc.rev.as_str()),
            Some(doc) => rev.as_deref().is_none_or(|rev| rev == doc.rev),
            None => rev.is_none(),
        };
        if !accepted {
            return Reply::conflict();
        }

        let new_rev = next_revision(previous);
        self.update_seq += 1;
        self.docs.insert(
            id.to_string(),
            StoredDocument {
                rev: new_rev.clone(),
                body,
                deleted: false,
                seq: self.update_seq,
            },
        );

        Reply::created(json!({ "ok": true, "id": id, "rev": new_rev })).with_etag(&new_rev)
    }

    /// Deletes `id`, which must be live and at revision `rev`.
    pub fn delete(&mut self, id: &str, rev: Option<&str>) -> Reply {
        let current = match self.docs.get(id) {
            Some(doc) if doc.deleted => return Reply::not_found("deleted"),
            Some(doc) => doc,
            None => return Reply::not_found("missing"),
        };
        if rev != Some(current.rev.as_str()) {
            return Reply::conflict();
        }

        let new_rev = next_revision(Some(current));
        self.update_seq += 1;
        self.docs.insert(
            id.to_string(),
            StoredDocument {
                rev: new_rev.clone(),
                body: Map::new(),
                deleted: true,
                seq: self.update_seq,
            },
        );

        Reply::ok(json!({ "ok": true, "id": id, "rev": new_rev })).with_etag(&new_rev)
    }

    /// Latest change of every document changed after `since`, in sequence order.
    pub fn changes(&self, since: u64) -> Reply {
        let mut changed: Vec<_> = self
            .docs
            .iter()
            .filter(|(_, doc)| doc.seq > since)
            .collect();
        changed.sort_by_key(|(_, doc)| doc.seq);

        let results: Vec<Value> = changed
            .into_iter()
            .map(|(id, doc)| {
                let mut change = json!({
                    "seq": doc.seq,
                    "id": id,
                    "changes": [ { "rev": doc.rev } ],
                });
                if doc.deleted {
                    change["deleted"] = Value::Bool(true);
                }
                change
            })
            .collect();

        Reply::ok(json!({ "results": results, "last_seq": self.update_seq }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn rev_of(reply: &Reply) -> String {
        reply.body["rev"].as_str().unwrap().to_string()
    }

    #[test]
    fn updates_require_the_current_revision() {
        let mut db = Database::default();
        let created = db.write("a", body(json!({ "n": 1 })), None);
        assert_eq!(created.status, 201);
        let first = rev_of(&created);
        assert!(first.starts_with("1-"));

        assert_eq!(db.write("a", body(json!({ "n": 2 })), None).status, 409);
        assert_eq!(db.write("a", body(json!({ "n": 2 })), Some("1-stale".into())).status, 409);

        let updated = db.write("a", body(json!({ "_rev": first, "n": 2 })), None);
        assert_eq!(updated.status, 201);
        assert!(rev_of(&updated).starts_with("2-"));
        assert_eq!(db.get("a", None).body["n"], 2);
    }

    #[test]
    fn deletes_leave_tombstones() {
        let mut db = Database::default();
        let rev = rev_of(&db.write("a", Map::new(), None));

        assert_eq!(db.delete("a", Some("9-x")).status, 409);
        assert_eq!(db.delete("a", Some(&rev)).status, 200);
        assert_eq!(db.head("a").status, 404);
        assert_eq!(db.get("a", None).body["reason"], "deleted");
        assert_eq!(db.delete("a", Some(&rev)).status, 404);

        let recreated = db.write("a", Map::new(), None);
        assert!(rev_of(&recreated).starts_with("3-"));
    }

    #[test]
    fn rejects_reserved_members_and_ids() {
        let mut db = Database::default();
        assert_eq!(db.write("_secret", Map::new(), None).status, 400);
        assert_eq!(db.write("a", body(json!({ "_hidden": true })), None).status, 400);
        assert_eq!(db.write("_design/app", body(json!({ "views": {} })), None).status, 201);
    }

    #[test]
    fn change_feed_lists_latest_changes_in_order() {
        let mut db = Database::default();
        let rev = rev_of(&db.write("a", Map::new(), None));
        db.write("b", Map::new(), None);
        db.delete("a", Some(&rev));

        let feed = db.changes(1).body;
        let ids: Vec<_> = feed["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|change| change["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(feed["results"][1]["deleted"], true);
        assert_eq!(feed["last_seq"], 3);
    }

    #[test]
    fn database_names_follow_server_rules() {
        assert!(is_valid_database_name("users"));
        assert!(is_valid_database_name("app_data-2"));
        assert!(!is_valid_database_name("Users"));
        assert!(!is_valid_database_name("_users"));
        assert!(!is_valid_database_name(""));
    }
}
