//! Main client interface for working with a remote document database.
//!
//! [`CouchClient`] is the façade the rest of an application talks to. Every operation takes
//! the database URL explicitly, so one client serves any number of databases.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::prelude::*;
//!
//! let transport = HttpTransportBuilder::new().build().await?;
//! let client = CouchClient::builder(transport).build();
//!
//! client.create_database("http://localhost:5984/users").await?;
//! client.store_one(&mut user, "http://localhost:5984/users", true).await?;
//! let same: User = client.get_document(user.id(), "http://localhost:5984/users").await?;
//! ```

use futures::future::try_join_all;
use mea::rwlock::RwLock;
use serde::de::DeserializeOwned;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, info};

use crate::{
    action::{Action, ActionId, ActionOutcome, BatchReport},
    app::DesignApplication,
    changes::ChangeSet,
    config::ClientConfig,
    document::{Document, DocumentExt, DocumentRef, WriteResponse},
    error::CouchResult,
    events::{DatabaseEvent, DatabaseListener},
    executor::{ActionExecutor, perform},
    probe::RevisionProber,
    serializer::{JsonSerializer, Serializer, SerializerExt},
    transport::{CouchRequest, Dispatcher, Transport},
    urls::{
        CHANGES, QueryParams, application_url, build_document_url, build_url, database_url,
        view_url,
    },
    view::{ViewRequest, ViewResult},
};

const REFERER: &str = "Referer";
const SINCE: &str = "since";

type Listeners = Arc<RwLock<Vec<Arc<dyn DatabaseListener>>>>;

/// Builder for [`CouchClient`].
#[derive(Debug)]
pub struct CouchClientBuilder {
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn Serializer>,
    config: ClientConfig,
    listeners: Vec<Arc<dyn DatabaseListener>>,
}

impl CouchClientBuilder {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            serializer: Arc::new(JsonSerializer),
            config: ClientConfig::default(),
            listeners: Vec::new(),
        }
    }

    /// Replaces the default [`JsonSerializer`].
    pub fn serializer<S: Serializer + 'static>(mut self, serializer: S) -> Self {
        self.serializer = Arc::new(serializer);
        self
    }

    /// Sets the batch settings: `max_workers`, `poll_interval` and `batch_timeout`.
    ///
    /// The connection settings of the configuration belong to the transport; pass the same
    /// configuration to `HttpTransportBuilder::from_config` to apply them.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn listener(mut self, listener: Arc<dyn DatabaseListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn build(self) -> CouchClient {
        let dispatcher = Dispatcher::new(self.transport, self.serializer);

        CouchClient {
            prober: RevisionProber::new(dispatcher.clone()),
            executor: ActionExecutor::new(dispatcher.clone(), &self.config),
            dispatcher,
            listeners: Arc::new(RwLock::new(self.listeners)),
        }
    }
}

/// Client for a remote document database.
///
/// Cheap to clone; clones share the transport, the batch worker limit and the listeners.
#[derive(Debug, Clone)]
pub struct CouchClient {
    dispatcher: Dispatcher,
    prober: RevisionProber,
    executor: ActionExecutor,
    listeners: Listeners,
}

impl CouchClient {
    /// Creates a client over `transport` with the default serializer and configuration.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        CouchClientBuilder::new(transport).build()
    }

    pub fn builder<T: Transport + 'static>(transport: T) -> CouchClientBuilder {
        CouchClientBuilder::new(transport)
    }

    /// Stores one document.
    ///
    /// # Arguments
    ///
    /// * `doc` - The document to store; receives the new revision on success
    /// * `db_url` - URL of the database
    /// * `skip_if_exists` - Leave an existing document with the same id untouched
    ///
    /// # Returns
    ///
    /// `true` if the document was written, `false` if it was skipped.
    ///
    /// # Errors
    ///
    /// Returns a [`CouchError::StatusMismatch`](crate::error::CouchError::StatusMismatch) if
    /// the server did not answer `201 Created`, e.g. on a revision conflict.
    pub async fn store_one<D: Document>(
        &self,
        doc: &mut D,
        db_url: &str,
        skip_if_exists: bool,
    ) -> CouchResult<bool> {
        if skip_if_exists && self.prober.document_exists(&*doc, db_url).await? {
            debug!(document = doc.id(), "document exists, skipping store");
            return Ok(false);
        }

        let action = Action::store(&*doc, false)?;
        let outcome = perform(&self.dispatcher, db_url, &action).await?;
        apply_outcome(doc, &outcome);
        Ok(true)
    }

    /// Stores several documents concurrently.
    ///
    /// With `skip_if_exists`, every document is probed first (concurrently) and existing ones
    /// are left out of the batch. Documents that were written receive their new revision,
    /// including when other members of the batch failed.
    ///
    /// `all_or_nothing` is advisory: documents written before a sibling failed stay written.
    ///
    /// # Errors
    ///
    /// Returns one [`CouchError::Batch`](crate::error::CouchError::Batch) owning every
    /// failure of the batch.
    pub async fn store_many<D: Document>(
        &self,
        docs: &mut [D],
        db_url: &str,
        skip_if_exists: bool,
        all_or_nothing: bool,
    ) -> CouchResult<()> {
        let existing = if skip_if_exists {
            try_join_all(docs.iter().map(|doc| self.prober.document_exists(doc, db_url))).await?
        } else {
            vec![false; docs.len()]
        };

        let mut pending = HashMap::new();
        let mut actions = Vec::new();
        for (index, doc) in docs.iter().enumerate() {
            if existing[index] {
                continue;
            }
            let action = Action::store(doc, false)?;
            pending.insert(action.id(), index);
            actions.push(action);
        }

        info!(
            db = db_url,
            submitted = actions.len(),
            skipped = docs.len() - actions.len(),
            all_or_nothing,
            "storing documents"
        );

        let report = self.executor.run(actions, db_url).await?;
        apply_report(docs, &pending, &report);
        report.into_result().map(|_| ())
    }

    /// Deletes one document if it exists.
    ///
    /// The document's current revision is probed first and written back to it; the delete
    /// is conditional on that revision.
    ///
    /// # Returns
    ///
    /// `true` if the document was deleted, `false` if it did not exist. Nothing is sent for
    /// an absent document.
    pub async fn delete_one<D: Document>(&self, doc: &mut D, db_url: &str) -> CouchResult<bool> {
        if !self.prober.probe_revision(doc, db_url).await? {
            debug!(document = doc.id(), "document absent, skipping delete");
            return Ok(false);
        }

        perform(&self.dispatcher, db_url, &Action::delete(&*doc)).await?;
        Ok(true)
    }

    /// Deletes several documents concurrently. Absent documents are skipped silently.
    ///
    /// `all_or_nothing` is advisory, as for [`CouchClient::store_many`].
    pub async fn delete_many<D: Document>(
        &self,
        docs: &mut [D],
        db_url: &str,
        all_or_nothing: bool,
    ) -> CouchResult<()> {
        let revisions = try_join_all(
            docs.iter()
                .map(|doc| self.prober.current_revision(doc.id(), db_url)),
        )
        .await?;

        let mut actions = Vec::new();
        for (doc, revision) in docs.iter_mut().zip(revisions) {
            if let Some(revision) = revision {
                doc.set_revision(Some(revision));
                actions.push(Action::delete(&*doc));
            }
        }

        info!(
            db = db_url,
            submitted = actions.len(),
            skipped = docs.len() - actions.len(),
            all_or_nothing,
            "deleting documents"
        );

        self.executor.execute(actions, db_url).await
    }

    /// Runs a caller-built set of actions as one batch, without filtering it first.
    ///
    /// Skip-if-exists stores and deletes without a revision probe the document inside
    /// their own task.
    pub async fn modify(
        &self,
        actions: Vec<Action>,
        db_url: &str,
        all_or_nothing: bool,
    ) -> CouchResult<HashMap<ActionId, ActionOutcome>> {
        info!(db = db_url, submitted = actions.len(), all_or_nothing, "modifying documents");
        self.executor.run(actions, db_url).await?.into_result()
    }

    /// Fetches a document and decodes it as `T`.
    ///
    /// A reference pinned to a revision fetches that revision.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::NotFound`](crate::error::CouchError::NotFound) if the document
    /// does not exist.
    pub async fn get_document<T: DeserializeOwned>(
        &self,
        reference: impl Into<DocumentRef>,
        db_url: &str,
    ) -> CouchResult<T> {
        let reference = reference.into();
        let url = build_document_url(db_url, &reference, true)?;
        self.dispatcher
            .execute_with_decoding(CouchRequest::get(url), "Failed to retrieve document")
            .await
    }

    /// Queries a view and decodes the whole response as `T`.
    pub async fn get_view<T: DeserializeOwned>(
        &self,
        request: &ViewRequest,
        db_url: &str,
    ) -> CouchResult<T> {
        let url = request.url(db_url)?;
        self.dispatcher
            .execute_with_decoding(CouchRequest::get(url), "Failed to retrieve view")
            .await
    }

    /// Queries a view with `include_docs=true` and returns the included documents.
    pub async fn get_view_listing<D: DeserializeOwned>(
        &self,
        request: &ViewRequest,
        db_url: &str,
    ) -> CouchResult<Vec<D>> {
        let request = request.to_builder().include_docs(true).build();
        let result: ViewResult<D> = self.get_view(&request, db_url).await?;
        Ok(result.documents())
    }

    /// Reads the database's change feed, starting after `since` when given.
    pub async fn get_changes(&self, db_url: &str, since: Option<&str>) -> CouchResult<ChangeSet> {
        let params: QueryParams = since
            .map(|since| (SINCE.to_string(), since.to_string()))
            .into_iter()
            .collect();
        let url = build_url(db_url, Some(&params), &[CHANGES])?;
        self.dispatcher
            .execute_with_decoding(CouchRequest::get(url), "Failed to retrieve changes")
            .await
    }

    /// Creates the database at `url`.
    ///
    /// # Errors
    ///
    /// Fails unless the server answers `201 Created`; an existing database is an error.
    pub async fn create_database(&self, url: &str) -> CouchResult<()> {
        let request = CouchRequest::put(database_url(url)?);
        self.dispatcher
            .execute_expect_status(request, 201, "Failed to create database")
            .await?;

        info!(db = url, "created database");
        self.notify(DatabaseEvent::created(url)).await;
        Ok(())
    }

    /// Drops the database at `url`. Dropping an absent database does nothing.
    pub async fn drop_database(&self, url: &str) -> CouchResult<()> {
        if !self.prober.exists(url).await? {
            debug!(db = url, "database absent, nothing to drop");
            return Ok(());
        }

        let request = CouchRequest::delete(database_url(url)?);
        self.dispatcher
            .execute_expect_status(request, 200, "Failed to drop database")
            .await?;

        info!(db = url, "dropped database");
        self.notify(DatabaseEvent::dropped(url)).await;
        Ok(())
    }

    pub async fn database_exists(&self, url: &str) -> CouchResult<bool> {
        self.prober.exists(url).await
    }

    pub async fn document_exists<D: Document>(&self, doc: &D, db_url: &str) -> CouchResult<bool> {
        self.prober.document_exists(doc, db_url).await
    }

    /// Installs a design application at `_design/<name>`.
    ///
    /// An application carrying a revision replaces that revision. The new revision is
    /// written back to `app`.
    pub async fn install_application(
        &self,
        app: &mut DesignApplication,
        db_url: &str,
    ) -> CouchResult<()> {
        let url = build_document_url(db_url, app, false)?;
        let serializer = self.dispatcher.serializer();
        let request = CouchRequest::put(url)
            .with_header(REFERER, db_url)
            .with_body(serializer.content_type(), serializer.serialize(&app.to_wire()?)?);

        let response = self
            .dispatcher
            .execute_expect_status(request, 201, "Failed to install application")
            .await?;

        let revision = serializer
            .decode::<WriteResponse>(&response.body)
            .ok()
            .and_then(|written| written.rev);
        if revision.is_some() {
            app.set_revision(revision);
        }

        info!(db = db_url, application = app.name(), "installed application");
        Ok(())
    }

    pub async fn application_exists(&self, base: &str, app: &str) -> CouchResult<bool> {
        self.prober.exists(application_url(base, app)?.as_str()).await
    }

    pub async fn view_exists(&self, base: &str, app: &str, view: &str) -> CouchResult<bool> {
        self.prober
            .exists(view_url(base, app, view, None)?.as_str())
            .await
    }

    /// Makes sure the database exists and has `app` installed. Safe to call repeatedly.
    pub async fn initialize(&self, db_url: &str, app: &mut DesignApplication) -> CouchResult<()> {
        if !self.database_exists(db_url).await? {
            self.create_database(db_url).await?;
        }

        if !self.application_exists(db_url, app.name()).await? {
            self.install_application(app, db_url).await?;
        }

        Ok(())
    }

    /// Registers a listener for database lifecycle events.
    pub async fn add_listener(&self, listener: Arc<dyn DatabaseListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Shuts the transport down. Later requests fail with
    /// [`CouchError::Closed`](crate::error::CouchError::Closed).
    pub async fn shutdown(&self) -> CouchResult<()> {
        info!("shutting down client");
        self.dispatcher.transport().shutdown().await
    }

    async fn notify(&self, event: DatabaseEvent) {
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            listener.database_changed(&event);
        }
    }
}

fn apply_outcome<D: Document>(doc: &mut D, outcome: &ActionOutcome) {
    if let ActionOutcome::Stored {
        revision: Some(revision),
        ..
    } = outcome
    {
        doc.set_revision(Some(revision.clone()));
    }
}

fn apply_report<D: Document>(docs: &mut [D], pending: &HashMap<ActionId, usize>, report: &BatchReport) {
    for (id, outcome) in &report.outcomes {
        if let Some(&index) = pending.get(id) {
            apply_outcome(&mut docs[index], outcome);
        }
    }
}
