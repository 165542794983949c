//! A resilient client layer over the REST protocol of a CouchDB-style document database.
//!
//! This crate is the core of the couchlayer project and provides:
//!
//! - **Document traits** ([`document`]) - Core traits for documents, their ids and revisions
//! - **Transport abstraction** ([`transport`]) - The seam HTTP implementations plug into
//! - **Serializer boundary** ([`serializer`]) - Encoding of bodies and decoding of server errors
//! - **URL building** ([`urls`]) - Deterministic composition of database, document and view URLs
//! - **Revision probes** ([`probe`]) - Cheap `HEAD`-based existence and revision checks
//! - **Batch execution** ([`action`], [`executor`]) - Concurrent stores and deletes with
//!   aggregated failures
//! - **Client façade** ([`client`]) - The operations applications call
//! - **Views and design applications** ([`view`], [`app`])
//! - **Change feeds and lifecycle events** ([`changes`], [`events`])
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use couchlayer_core::{CouchClient, Document};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id")]
//!     pub id: String,
//!     #[serde(rename = "_rev", skip_serializing_if = "Option::is_none", default)]
//!     pub rev: Option<String>,
//!     pub name: String,
//! }
//!
//! impl Document for User {
//!     fn id(&self) -> &str {
//!         &self.id
//!     }
//!
//!     fn revision(&self) -> Option<&str> {
//!         self.rev.as_deref()
//!     }
//!
//!     fn set_revision(&mut self, revision: Option<String>) {
//!         self.rev = revision;
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_core;

pub mod action;
pub mod app;
pub mod changes;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod executor;
pub mod ids;
pub mod probe;
pub mod serializer;
pub mod transport;
pub mod urls;
pub mod view;

pub use client::{CouchClient, CouchClientBuilder};
pub use document::{Document, DocumentExt, DocumentRef};
pub use error::{CouchError, CouchResult};
