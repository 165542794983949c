//! Main couchlayer crate providing a concurrent client for CouchDB-style document databases.
//!
//! This crate is the primary entry point for users of couchlayer. It re-exports the core
//! types and functionality from the sub-crates and gives access to the available transports.
//!
//! # Features
//!
//! - **Typed documents** - Define documents with Serde and let the client track their revisions
//! - **Concurrent batches** - Store or delete many documents at once with bounded parallelism
//! - **Optimistic concurrency** - Revisions are probed with `HEAD` and conflicts surface as errors
//! - **Views and design applications** - Install design documents and read typed view results
//! - **Pluggable transports** - Talk HTTP to a real server or use the in-memory database in tests
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer::{prelude::*, memory::InMemoryTransport};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: String,
//!     #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
//!     pub rev: Option<String>,
//!     pub name: String,
//! }
//!
//! impl Document for User {
//!     fn id(&self) -> &str { &self.id }
//!     fn revision(&self) -> Option<&str> { self.rev.as_deref() }
//!     fn set_revision(&mut self, revision: Option<String>) { self.rev = revision; }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = CouchClient::new(InMemoryTransport::builder().build().await.unwrap());
//!     let db = "http://localhost:5984/users";
//!
//!     client.create_database(db).await.unwrap();
//!
//!     let mut users = vec![
//!         User { id: "alice".into(), rev: None, name: "Alice".into() },
//!         User { id: "bob".into(), rev: None, name: "Bob".into() },
//!     ];
//!
//!     // Both documents are written concurrently and receive their revisions
//!     client.store_many(&mut users, db, false, false).await.unwrap();
//!
//!     let alice: User = client.get_document("alice", db).await.unwrap();
//!     println!("Fetched user: {:?}", alice);
//!
//!     client.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Design Applications
//!
//! Views live in design documents. [`app::DesignApplication`] builds one in code or loads it
//! from JSON, and [`CouchClient::initialize`] creates the database and installs the
//! application when either is missing:
//!
//! ```ignore
//! use couchlayer::{prelude::*, view::ViewRequest};
//!
//! let mut app = DesignApplication::new("user-logic")
//!     .with_view("all-users", "function(doc) { emit(doc._id, null); }");
//!
//! client.initialize(db, &mut app).await?;
//!
//! let users: Vec<User> = client
//!     .get_view_listing(&ViewRequest::new("user-logic", "all-users"), db)
//!     .await?;
//! ```
//!
//! # Transports
//!
//! - [`memory`] - In-memory database for development and testing
//! - [`http`] - Pooled HTTP transport for real servers (requires `http` feature)

pub mod prelude;

pub use couchlayer_core::{
    action, app, changes, client, config, document, error, events, ids, probe, serializer,
    transport, urls, view,
};
pub use couchlayer_core::{CouchClient, CouchClientBuilder};

/// In-memory transport implementations.
pub mod memory {
    pub use couchlayer_memory::{InMemoryTransport, InMemoryTransportBuilder, MapFn, RecordedRequest};
}

/// HTTP transport implementations.
///
/// This module is only available when the `http` feature is enabled.
#[cfg(feature = "http")]
pub mod http {
    pub use couchlayer_http::{HttpTransport, HttpTransportBuilder};
}
