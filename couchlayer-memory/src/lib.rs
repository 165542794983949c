//! In-memory document database for couchlayer.
//!
//! This crate provides [`InMemoryTransport`], a [`Transport`](couchlayer_core::transport::Transport)
//! that answers requests itself instead of sending them over the network. It speaks the same
//! REST protocol as the real server, including revision checks, conflicts, tombstones, the
//! change feed and views, so the client can be exercised end to end without a running
//! database. It is intended for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent requests serialized through an async-aware RwLock
//! - **Optimistic concurrency** - Stale revisions are rejected with `409 Conflict`
//! - **Views** - Backed by registered Rust map functions, with built-in `_count`/`_sum` reduces
//! - **Request log** - Every received request is recorded for assertions
//!
//! # Quick Start
//!
//! ```ignore
//! use couchlayer_core::{CouchClient, transport::TransportBuilder};
//! use couchlayer_memory::InMemoryTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = InMemoryTransport::builder().build().await?;
//!     let client = CouchClient::new(transport.clone());
//!
//!     client.create_database("http://localhost:5984/users").await?;
//!     assert_eq!(transport.databases().await, vec!["users".to_string()]);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_memory;

mod collate;
mod state;
pub mod transport;
pub mod views;

pub use transport::{InMemoryTransport, InMemoryTransportBuilder, RecordedRequest};
pub use views::MapFn;
