//! View requests and view results.
//!
//! A [`ViewRequest`] names a design application, a view inside it, and the query parameters
//! to send. Parameter values follow the server's conventions: keys are JSON-encoded, flags
//! are `true`/`false`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

use crate::{
    error::CouchResult,
    urls::{QueryParams, view_url},
};

pub const KEY: &str = "key";
pub const START_KEY: &str = "startkey";
pub const END_KEY: &str = "endkey";
pub const INCLUDE_DOCS: &str = "include_docs";
pub const LIMIT: &str = "limit";
pub const SKIP: &str = "skip";
pub const DESCENDING: &str = "descending";
pub const REDUCE: &str = "reduce";

/// Identifies one view query. Immutable once built.
///
/// # Example
///
/// ```ignore
/// let request = ViewRequest::builder("user-logic", "all-users")
///     .include_docs(true)
///     .key("user:admin")
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    application: String,
    view: String,
    params: QueryParams,
}

impl ViewRequest {
    /// Creates a request without query parameters.
    pub fn new(application: impl Into<String>, view: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            view: view.into(),
            params: QueryParams::new(),
        }
    }

    pub fn builder(application: impl Into<String>, view: impl Into<String>) -> ViewRequestBuilder {
        ViewRequestBuilder {
            request: Self::new(application, view),
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Returns a builder seeded with this request, for deriving a variant.
    pub fn to_builder(&self) -> ViewRequestBuilder {
        ViewRequestBuilder {
            request: self.clone(),
        }
    }

    /// Composes the view URL under `db_url`.
    pub fn url(&self, db_url: &str) -> CouchResult<Url> {
        view_url(db_url, &self.application, &self.view, Some(&self.params))
    }
}

impl fmt::Display for ViewRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application, self.view)
    }
}

/// Builder for [`ViewRequest`].
#[derive(Debug, Clone)]
pub struct ViewRequestBuilder {
    request: ViewRequest,
}

impl ViewRequestBuilder {
    /// Sets a raw parameter. An existing key keeps its position.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.params.set(key, value);
        self
    }

    pub fn key(self, key: impl Into<Value>) -> Self {
        self.parameter(KEY, key.into().to_string())
    }

    pub fn start_key(self, key: impl Into<Value>) -> Self {
        self.parameter(START_KEY, key.into().to_string())
    }

    pub fn end_key(self, key: impl Into<Value>) -> Self {
        self.parameter(END_KEY, key.into().to_string())
    }

    pub fn include_docs(self, include: bool) -> Self {
        self.parameter(INCLUDE_DOCS, include.to_string())
    }

    pub fn limit(self, limit: usize) -> Self {
        self.parameter(LIMIT, limit.to_string())
    }

    pub fn skip(self, skip: usize) -> Self {
        self.parameter(SKIP, skip.to_string())
    }

    pub fn descending(self, descending: bool) -> Self {
        self.parameter(DESCENDING, descending.to_string())
    }

    pub fn reduce(self, reduce: bool) -> Self {
        self.parameter(REDUCE, reduce.to_string())
    }

    pub fn build(self) -> ViewRequest {
        self.request
    }
}

/// Decoded response of a view query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewResult<D = Value> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    pub rows: Vec<ViewRow<D>>,
}

/// One row of a view result. `doc` is only present with `include_docs=true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRow<D = Value> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<D>,
}

impl<D> ViewResult<D> {
    /// Extracts the included documents, skipping rows without one.
    pub fn documents(self) -> Vec<D> {
        self.rows
            .into_iter()
            .filter_map(|row| row.doc)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Profile {
        #[serde(rename = "_id")]
        id: String,
        age: u32,
    }

    #[test]
    fn rows_decode_into_documents_without_defaults() {
        let result: ViewResult<Profile> = serde_json::from_value(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                { "id": "alice", "key": 30, "value": null, "doc": { "_id": "alice", "age": 30 } },
                { "id": "bob", "key": 40, "value": null }
            ]
        }))
        .unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.rows[1].doc.is_none());
        assert_eq!(
            result.documents(),
            vec![Profile { id: "alice".into(), age: 30 }]
        );
    }

    #[test]
    fn builder_encodes_keys_as_json() {
        let request = ViewRequest::builder("user-logic", "all-users")
            .key("user:admin")
            .include_docs(true)
            .build();
        assert_eq!(
            request.url("http://h/db").unwrap().as_str(),
            "http://h/db/_design/user-logic/_view/all-users?key=%22user%3Aadmin%22&include_docs=true"
        );
        assert_eq!(request.to_string(), "user-logic/all-users");
    }

    #[test]
    fn replacing_a_parameter_keeps_its_position() {
        let request = ViewRequest::builder("app", "v")
            .limit(5)
            .descending(true)
            .limit(10)
            .build();
        let params: Vec<_> = request.params().iter().collect();
        assert_eq!(params, vec![("limit", "10"), ("descending", "true")]);
    }

    #[test]
    fn view_result_extracts_included_documents() {
        let result: ViewResult = serde_json::from_value(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                { "id": "a", "key": "a", "value": null, "doc": { "_id": "a" } },
                { "id": "b", "key": "b", "value": 1 }
            ]
        }))
        .unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.documents(), vec![json!({ "_id": "a" })]);
    }

    #[test]
    fn reduced_rows_decode_without_ids() {
        let result: ViewResult = serde_json::from_value(json!({
            "rows": [ { "key": null, "value": 42 } ]
        }))
        .unwrap();
        assert_eq!(result.total_rows, None);
        assert_eq!(result.rows[0].value, json!(42));
        assert!(result.rows[0].id.is_none());
    }
}
