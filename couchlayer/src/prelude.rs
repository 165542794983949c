//! Convenient re-exports of commonly used types from couchlayer.
//!
//! ```ignore
//! use couchlayer::prelude::*;
//! ```
//!
//! This provides access to the client and its builder, document traits, batch actions,
//! design applications, transports, and the error types.

pub use couchlayer_core::{
    action::{Action, ActionId, ActionKind, ActionOutcome, BatchReport},
    app::DesignApplication,
    client::{CouchClient, CouchClientBuilder},
    config::ClientConfig,
    document::{Document, DocumentExt, DocumentRef},
    error::{BatchError, CouchError, CouchResult},
    events::{DatabaseEvent, DatabaseEventKind, DatabaseListener},
    transport::{Transport, TransportBuilder},
    view::{ViewRequest, ViewResult},
};
