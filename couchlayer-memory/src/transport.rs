//! In-memory transport emulating the document database's REST protocol.
//!
//! Requests are routed on their path, exactly as the real server would see them:
//!
//! | path                                  | methods                        |
//! |---------------------------------------|--------------------------------|
//! | `/<db>`                               | `PUT`, `DELETE`, `HEAD`, `GET`, `POST` |
//! | `/<db>/_changes`                      | `GET`                          |
//! | `/<db>/<id>`, `/<db>/_design/<app>`   | `HEAD`, `GET`, `PUT`, `DELETE` |
//! | `/<db>/_design/<app>/_view/<view>`    | `HEAD`, `GET`                  |
//!
//! The host part of the URL is ignored, so every base URL reaches the same set of
//! databases.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde_json::{Map, Value, json};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::debug;
use url::Url;

use couchlayer_core::{
    error::{CouchError, CouchResult},
    ids::new_document_id,
    transport::{CouchRequest, CouchResponse, Method, Transport, TransportBuilder},
};

use crate::{
    state::{Database, Reply, is_valid_database_name},
    views::{MapFn, query_view},
};

/// A request the transport has received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
}

#[derive(Default)]
struct ServerState {
    databases: HashMap<String, Database>,
    views: HashMap<(String, String), MapFn>,
    requests: Vec<RecordedRequest>,
    closed: bool,
}

/// Thread-safe in-memory stand-in for a remote document database.
///
/// `InMemoryTransport` is cloneable; clones share the same databases, so a test can keep
/// one clone to inspect state while a client owns another.
///
/// # Example
///
/// ```ignore
/// use couchlayer_memory::InMemoryTransport;
/// use couchlayer_core::CouchClient;
///
/// let transport = InMemoryTransport::builder()
///     .view("user-logic", "all-users", |doc| vec![(doc["_id"].clone(), Value::Null)])
///     .build()
///     .await?;
/// let client = CouchClient::new(transport.clone());
/// client.create_database("http://localhost:5984/users").await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<RwLock<ServerState>>,
}

impl fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransport").finish_non_exhaustive()
    }
}

impl InMemoryTransport {
    /// Creates a transport with no databases and no registered views.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryTransportBuilder {
        InMemoryTransportBuilder::default()
    }

    /// Registers the map function backing `app/view`. The view also has to be defined by
    /// an installed design application before it can be queried.
    pub async fn register_view<F>(&self, app: &str, view: &str, map: F)
    where
        F: Fn(&Value) -> Vec<(Value, Value)> + Send + Sync + 'static,
    {
        self.state
            .write()
            .await
            .views
            .insert((app.to_string(), view.to_string()), Arc::new(map));
    }

    /// Every request received so far, oldest first.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.read().await.requests.clone()
    }

    /// Number of received requests using `method`.
    pub async fn count_requests(&self, method: Method) -> usize {
        self.state
            .read()
            .await
            .requests
            .iter()
            .filter(|request| request.method == method)
            .count()
    }

    pub async fn clear_requests(&self) {
        self.state.write().await.requests.clear();
    }

    /// Names of the existing databases, sorted.
    pub async fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().await.databases.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of live documents in `db`, design documents included.
    pub async fn document_count(&self, db: &str) -> Option<usize> {
        self.state
            .read()
            .await
            .databases
            .get(db)
            .map(|database| database.docs.values().filter(|doc| !doc.deleted).count())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn execute(&self, request: CouchRequest) -> CouchResult<CouchResponse> {
        let mut state = self.state.write().await;
        if state.closed {
            return Err(CouchError::Closed);
        }

        state.requests.push(RecordedRequest {
            method: request.method,
            url: request.url.to_string(),
        });

        let reply = state.handle(&request);
        debug!(
            method = %request.method,
            url = %request.url,
            status = reply.status,
            "handled in-memory request"
        );

        into_response(reply, request.method)
    }

    async fn shutdown(&self) -> CouchResult<()> {
        self.state.write().await.closed = true;
        Ok(())
    }
}

fn into_response(reply: Reply, method: Method) -> CouchResult<CouchResponse> {
    let mut response = CouchResponse::new(reply.status);
    if let Some(etag) = reply.etag {
        response = response.with_header("ETag", etag);
    }
    if method != Method::Head && !reply.body.is_null() {
        response = response
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::to_vec(&reply.body)?);
    }
    Ok(response)
}

fn path_segments(url: &Url) -> Result<Vec<String>, Reply> {
    url.path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|decoded| decoded.into_owned())
                .map_err(|_| Reply::bad_request(format!("Invalid path segment {segment}")))
        })
        .collect()
}

fn json_body(request: &CouchRequest) -> Result<Map<String, Value>, Reply> {
    let body = request
        .body
        .as_deref()
        .ok_or_else(|| Reply::bad_request("Request body is missing"))?;

    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Reply::bad_request("Document must be a JSON object")),
        Err(_) => Err(Reply::bad_request("invalid UTF-8 JSON")),
    }
}

fn method_not_allowed(allowed: &str) -> Reply {
    Reply::error(
        405,
        "method_not_allowed",
        format!("Only {allowed} allowed"),
    )
}

fn missing_database() -> Reply {
    Reply::not_found("Database does not exist.")
}

impl ServerState {
    fn handle(&mut self, request: &CouchRequest) -> Reply {
        let segments = match path_segments(&request.url) {
            Ok(segments) => segments,
            Err(reply) => return reply,
        };
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

        match parts.as_slice() {
            [] => Reply::ok(json!({ "couchdb": "Welcome", "vendor": { "name": "couchlayer-memory" } })),
            [db] => self.database(request, db),
            [db, "_changes"] => self.changes(request.method, db, &params),
            [db, "_design", app, "_view", view] => {
                self.view(request.method, db, app, view, &params)
            }
            [db, "_design", app] => self.document(request, db, &format!("_design/{app}"), &params),
            [db, id] => self.document(request, db, id, &params),
            _ => Reply::not_found("missing"),
        }
    }

    fn database(&mut self, request: &CouchRequest, name: &str) -> Reply {
        match request.method {
            Method::Put => {
                if !is_valid_database_name(name) {
                    return Reply::error(
                        400,
                        "illegal_database_name",
                        format!("Name: '{name}'. Only lowercase characters (a-z), digits (0-9), and any of the characters _, $, (, ), +, -, and / are allowed. Must begin with a letter."),
                    );
                }
                if self.databases.contains_key(name) {
                    return Reply::error(
                        412,
                        "file_exists",
                        "The database could not be created, the file already exists.",
                    );
                }
                self.databases.insert(name.to_string(), Database::default());
                Reply::created(json!({ "ok": true }))
            }
            Method::Delete => match self.databases.remove(name) {
                Some(_) => Reply::ok(json!({ "ok": true })),
                None => missing_database(),
            },
            Method::Head | Method::Get => match self.databases.get(name) {
                Some(database) => database.info(name),
                None => missing_database(),
            },
            Method::Post => {
                let Some(database) = self.databases.get_mut(name) else {
                    return missing_database();
                };
                let body = match json_body(request) {
                    Ok(body) => body,
                    Err(reply) => return reply,
                };
                let id = match body.get("_id") {
                    Some(Value::String(id)) => id.clone(),
                    Some(_) => return Reply::bad_request("Document id must be a string"),
                    None => new_document_id(),
                };
                database.write(&id, body, None)
            }
        }
    }

    fn document(
        &mut self,
        request: &CouchRequest,
        db: &str,
        id: &str,
        params: &HashMap<String, String>,
    ) -> Reply {
        let Some(database) = self.databases.get_mut(db) else {
            return missing_database();
        };
        let rev = params.get("rev").cloned();

        match request.method {
            Method::Head => database.head(id),
            Method::Get => database.get(id, rev.as_deref()),
            Method::Put => match json_body(request) {
                Ok(body) => database.write(id, body, rev),
                Err(reply) => reply,
            },
            Method::Delete => database.delete(id, rev.as_deref()),
            Method::Post => method_not_allowed("DELETE,GET,HEAD,PUT"),
        }
    }

    fn changes(&self, method: Method, db: &str, params: &HashMap<String, String>) -> Reply {
        if method != Method::Get {
            return method_not_allowed("GET");
        }
        let Some(database) = self.databases.get(db) else {
            return missing_database();
        };
        let since = match params.get("since").map(String::as_str) {
            None | Some("0") => 0,
            Some("now") => database.update_seq,
            Some(raw) => match raw.parse() {
                Ok(since) => since,
                Err(_) => return Reply::bad_request(format!("Invalid since sequence {raw}")),
            },
        };
        database.changes(since)
    }

    fn view(
        &self,
        method: Method,
        db: &str,
        app: &str,
        view: &str,
        params: &HashMap<String, String>,
    ) -> Reply {
        if !matches!(method, Method::Get | Method::Head) {
            return method_not_allowed("GET,HEAD");
        }
        let Some(database) = self.databases.get(db) else {
            return missing_database();
        };
        let map = self.views.get(&(app.to_string(), view.to_string()));
        query_view(database, app, view, map, params, method == Method::Head)
    }
}

/// Builder for [`InMemoryTransport`], with map functions registered up front.
#[derive(Default)]
pub struct InMemoryTransportBuilder {
    views: Vec<(String, String, MapFn)>,
}

impl InMemoryTransportBuilder {
    pub fn view<F>(mut self, app: &str, view: &str, map: F) -> Self
    where
        F: Fn(&Value) -> Vec<(Value, Value)> + Send + Sync + 'static,
    {
        self.views
            .push((app.to_string(), view.to_string(), Arc::new(map)));
        self
    }
}

#[async_trait]
impl TransportBuilder for InMemoryTransportBuilder {
    type Transport = InMemoryTransport;

    /// Builds a transport with the registered views. This always succeeds.
    async fn build(self) -> CouchResult<Self::Transport> {
        let transport = InMemoryTransport::new();
        {
            let mut state = transport.state.write().await;
            for (app, view, map) in self.views {
                state.views.insert((app, view), map);
            }
        }
        Ok(transport)
    }
}
