//! Existence and revision probes over `HEAD` requests.
//!
//! A probe never reads a response body on the 200/404 paths, which keeps it cheap enough to
//! run before every conditional store or delete. A `404` is an ordinary answer here, not an
//! error.

use tracing::debug;

use crate::{
    document::Document,
    error::{CouchError, CouchResult},
    transport::{CouchRequest, Dispatcher},
    urls::{database_url, document_url},
};

const ETAG: &str = "ETag";

#[derive(Debug, Clone)]
pub struct RevisionProber {
    dispatcher: Dispatcher,
}

impl RevisionProber {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Whether the resource at `url` exists.
    ///
    /// # Errors
    ///
    /// Any status other than 200 or 404 is a [`CouchError::StatusMismatch`] carrying the
    /// decoded server error.
    pub async fn exists(&self, url: &str) -> CouchResult<bool> {
        let url = database_url(url)?;
        let location = url.to_string();
        let response = self
            .dispatcher
            .execute(CouchRequest::head(url), "Failed to ping database URL")
            .await?;

        match response.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(self.dispatcher.status_error(
                "Failed to ping database URL",
                &location,
                200,
                &response,
            )),
        }
    }

    /// Current revision of the document `id`, or `None` when it does not exist.
    pub async fn current_revision(&self, id: &str, db_url: &str) -> CouchResult<Option<String>> {
        let url = document_url(db_url, id, None)?;
        let location = url.to_string();
        let response = self
            .dispatcher
            .execute(CouchRequest::head(url), "Failed to probe document revision")
            .await?;

        match response.status {
            200 => {
                let etag = response.header(ETAG).map(unquote).unwrap_or_default();
                if etag.is_empty() {
                    return Err(CouchError::Protocol(format!(
                        "Response for {location} carries no {ETAG} header"
                    )));
                }
                debug!(document = id, revision = etag, "probed revision");
                Ok(Some(etag.to_string()))
            }
            404 => Ok(None),
            _ => Err(self.dispatcher.status_error(
                "Failed to probe document revision",
                &location,
                200,
                &response,
            )),
        }
    }

    /// Probes `doc` and, when it exists, records its current revision on it.
    ///
    /// Returns `false` without touching the document when it does not exist.
    pub async fn probe_revision<D: Document>(&self, doc: &mut D, db_url: &str) -> CouchResult<bool> {
        match self.current_revision(doc.id(), db_url).await? {
            Some(revision) => {
                doc.set_revision(Some(revision));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether `doc` exists, leaving its revision untouched.
    pub async fn document_exists<D: Document>(&self, doc: &D, db_url: &str) -> CouchResult<bool> {
        Ok(self.current_revision(doc.id(), db_url).await?.is_some())
    }
}

/// Strips one optional leading and one optional trailing quote character.
pub(crate) fn unquote(value: &str) -> &str {
    let is_quote = |c: char| c == '"' || c == '\'';
    let value = value.trim();
    let value = value.strip_prefix(is_quote).unwrap_or(value);
    value.strip_suffix(is_quote).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        document::DocumentRef,
        error::CouchResult,
        serializer::JsonSerializer,
        transport::{CouchResponse, Transport},
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Canned(CouchResponse);

    #[async_trait]
    impl Transport for Canned {
        async fn execute(&self, request: CouchRequest) -> CouchResult<CouchResponse> {
            assert!(request.body.is_none());
            Ok(self.0.clone())
        }
    }

    fn prober(response: CouchResponse) -> RevisionProber {
        RevisionProber::new(Dispatcher::new(
            Arc::new(Canned(response)),
            Arc::new(JsonSerializer),
        ))
    }

    #[test]
    fn unquote_strips_one_quote_on_each_side() {
        assert_eq!(unquote("\"1-abc\""), "1-abc");
        assert_eq!(unquote("'1-abc'"), "1-abc");
        assert_eq!(unquote("1-abc"), "1-abc");
        assert_eq!(unquote("\"\"1-abc\"\""), "\"1-abc\"");
    }

    #[tokio::test]
    async fn absent_resource_is_not_an_error() {
        assert!(!prober(CouchResponse::new(404)).exists("http://h/db").await.unwrap());
        assert!(prober(CouchResponse::new(200)).exists("http://h/db").await.unwrap());
    }

    #[tokio::test]
    async fn server_error_carries_decoded_body() {
        let err = prober(
            CouchResponse::new(500).with_body(r#"{"error":"internal_error","reason":"boom"}"#),
        )
        .exists("http://h/db")
        .await
        .unwrap_err();

        match err {
            CouchError::StatusMismatch { info, .. } => {
                assert_eq!(info.status, 500);
                assert_eq!(info.body.unwrap().reason.as_deref(), Some("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn probe_writes_unquoted_revision_back() {
        let mut doc = DocumentRef::new("user:admin");
        let found = prober(CouchResponse::new(200).with_header("ETag", "\"2-b\""))
            .probe_revision(&mut doc, "http://h/db")
            .await
            .unwrap();
        assert!(found);
        assert_eq!(doc.revision(), Some("2-b"));
    }

    #[tokio::test]
    async fn missing_document_keeps_its_revision() {
        let mut doc = DocumentRef::new("gone").with_revision("1-a");
        let found = prober(CouchResponse::new(404))
            .probe_revision(&mut doc, "http://h/db")
            .await
            .unwrap();
        assert!(!found);
        assert_eq!(doc.revision(), Some("1-a"));
    }

    #[tokio::test]
    async fn missing_etag_is_a_protocol_error() {
        let mut doc = DocumentRef::new("a");
        let err = prober(CouchResponse::new(200))
            .probe_revision(&mut doc, "http://h/db")
            .await
            .unwrap_err();
        assert!(matches!(err, CouchError::Protocol(_)));
    }
}
