//! URL composition for documents, views and design applications.
//!
//! All URLs are built from an explicit database base URL; there is no implicit endpoint.
//! Path segments are joined with exactly one slash and query parameters keep their insertion
//! order so that generated URLs are deterministic.

use url::Url;

use crate::{
    document::Document,
    error::{CouchError, CouchResult},
};

/// Path segment under which design applications live.
pub const APP_BASE: &str = "_design";
/// Path segment under which views of a design application live.
pub const VIEW_BASE: &str = "_view";
/// Path segment of the database change feed.
pub const CHANGES: &str = "_changes";
/// Query parameter carrying a document revision.
pub const REV: &str = "rev";

/// Ordered query parameters with unique keys.
///
/// Setting a key that is already present replaces its value in place, so the position of the
/// first insertion is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`QueryParams::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn to_query_string(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K, V> FromIterator<(K, V)> for QueryParams
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

/// Joins `segments` onto `base` and appends `params` as a query string.
///
/// Each segment's own leading slash is stripped and exactly one slash separates it from
/// what precedes it. Segments are appended as given; callers encode ids beforehand (see
/// [`encode_document_id`]).
///
/// # Errors
///
/// Returns [`CouchError::MalformedUrl`] if the result is not an absolute, hierarchical URL.
///
/// # Example
///
/// ```ignore
/// let params = QueryParams::new().with("key", "v");
/// let url = build_url("http://h/db", Some(&params), &["_design", "app", "_view", "byName"])?;
/// assert_eq!(url.as_str(), "http://h/db/_design/app/_view/byName?key=v");
/// ```
pub fn build_url<S: AsRef<str>>(
    base: &str,
    params: Option<&QueryParams>,
    segments: &[S],
) -> CouchResult<Url> {
    let mut url = String::from(base);

    for segment in segments {
        let segment = segment.as_ref();
        let segment = segment.strip_prefix('/').unwrap_or(segment);

        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(segment);
    }

    if let Some(params) = params.filter(|p| !p.is_empty()) {
        url.push('?');
        url.push_str(&params.to_query_string());
    }

    let parsed = Url::parse(&url).map_err(|e| CouchError::MalformedUrl {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    if parsed.cannot_be_a_base() {
        return Err(CouchError::MalformedUrl {
            url,
            reason: "not a hierarchical URL".to_string(),
        });
    }

    Ok(parsed)
}

/// Validates a database base URL.
pub fn database_url(base: &str) -> CouchResult<Url> {
    build_url::<&str>(base, None, &[])
}

/// Percent-encodes a document id for use as a path segment.
///
/// Design document ids keep their literal `_design/` prefix.
pub fn encode_document_id(id: &str) -> String {
    match id.strip_prefix("_design/") {
        Some(name) => format!("{}/{}", APP_BASE, urlencoding::encode(name)),
        None => urlencoding::encode(id).into_owned(),
    }
}

/// Builds the URL of a document, adding `rev=<revision>` when a revision is given.
pub fn document_url(base: &str, id: &str, revision: Option<&str>) -> CouchResult<Url> {
    let encoded = encode_document_id(id);

    match revision {
        Some(rev) => {
            let params = QueryParams::new().with(REV, rev);
            build_url(base, Some(&params), &[encoded])
        }
        None => build_url(base, None, &[encoded]),
    }
}

/// Builds the URL of `doc`. With `include_revision`, a known revision is added as the
/// `rev` query parameter, which makes deletes and overwrites conditional.
pub fn build_document_url<D: Document>(
    base: &str,
    doc: &D,
    include_revision: bool,
) -> CouchResult<Url> {
    let revision = if include_revision { doc.revision() } else { None };
    document_url(base, doc.id(), revision)
}

/// Builds the URL of a design application.
pub fn application_url(base: &str, app: &str) -> CouchResult<Url> {
    build_url(base, None, &[APP_BASE, app])
}

/// Builds the URL of a view, with optional query parameters.
pub fn view_url(
    base: &str,
    app: &str,
    view: &str,
    params: Option<&QueryParams>,
) -> CouchResult<Url> {
    build_url(base, params, &[APP_BASE, app, VIEW_BASE, view])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentRef;

    #[test]
    fn builds_view_url_with_parameters() {
        let params = QueryParams::new().with("key", "v");
        let url = build_url("http://h/db", Some(&params), &["_design", "app", "_view", "byName"])
            .unwrap();
        assert_eq!(url.as_str(), "http://h/db/_design/app/_view/byName?key=v");
    }

    #[test]
    fn never_doubles_slashes() {
        let url = build_url::<&str>("http://h/db/", None, &["/doc1"]).unwrap();
        assert_eq!(url.as_str(), "http://h/db/doc1");
    }

    #[test]
    fn empty_parameters_add_no_query_string() {
        let url = build_url("http://h/db", Some(&QueryParams::new()), &["doc"]).unwrap();
        assert_eq!(url.as_str(), "http://h/db/doc");
    }

    #[test]
    fn keeps_parameter_insertion_order() {
        let params = QueryParams::new()
            .with("startkey", "\"a\"")
            .with("include_docs", "true")
            .with("limit", "10")
            .with("include_docs", "false");
        let url = view_url("http://h/db", "app", "all", Some(&params)).unwrap();
        assert_eq!(
            url.as_str(),
            "http://h/db/_design/app/_view/all?startkey=%22a%22&include_docs=false&limit=10"
        );
    }

    #[test]
    fn rejects_relative_and_opaque_urls() {
        assert!(matches!(
            build_url::<&str>("h/db", None, &["doc"]),
            Err(CouchError::MalformedUrl { .. })
        ));
        assert!(matches!(
            database_url("mailto:someone"),
            Err(CouchError::MalformedUrl { .. })
        ));
    }

    #[test]
    fn document_url_adds_revision_only_when_asked() {
        let doc = DocumentRef::new("doc1").with_revision("1-abc");
        assert_eq!(
            build_document_url("http://h/db", &doc, true).unwrap().as_str(),
            "http://h/db/doc1?rev=1-abc"
        );
        assert_eq!(
            build_document_url("http://h/db", &doc, false).unwrap().as_str(),
            "http://h/db/doc1"
        );

        let fresh = DocumentRef::new("doc2");
        assert_eq!(
            build_document_url("http://h/db", &fresh, true).unwrap().as_str(),
            "http://h/db/doc2"
        );
    }

    #[test]
    fn encodes_ids_but_keeps_design_prefix() {
        assert_eq!(encode_document_id("user:admin"), "user%3Aadmin");
        assert_eq!(encode_document_id("a/b"), "a%2Fb");
        assert_eq!(encode_document_id("_design/user-logic"), "_design/user-logic");
        assert_eq!(
            application_url("http://h/db", "user-logic").unwrap().as_str(),
            "http://h/db/_design/user-logic"
        );
    }
}
