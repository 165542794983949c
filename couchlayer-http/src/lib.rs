//! HTTP transport for couchlayer.
//!
//! This crate provides [`HttpTransport`], the [`Transport`](couchlayer_core::transport::Transport)
//! that talks to a real CouchDB-style server. It is enabled by default through the `http`
//! feature of the `couchlayer` crate:
//!
//! ```toml
//! [dependencies]
//! couchlayer = { version = "x.y.z", features = ["http"] }
//! ```
//!
//! # Features
//!
//! - **Bounded concurrency** - At most `max_connections` requests in flight, 20 by default
//! - **Pooled connections** - Idle connections are closed after a short grace period
//! - **Explicit shutdown** - Requests after shutdown fail instead of reopening the pool
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::{CouchClient, http::HttpTransport, transport::TransportBuilder};
//!
//! let transport = HttpTransport::builder()
//!     .max_connections(20)
//!     .idle_timeout(Duration::from_secs(2))
//!     .build()
//!     .await?;
//!
//! let client = CouchClient::new(transport);
//! client.create_database("http://localhost:5984/users").await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as couchlayer_http;

pub mod transport;

pub use transport::{HttpTransport, HttpTransportBuilder};
