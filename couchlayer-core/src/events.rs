//! Database lifecycle events.
//!
//! Listeners registered on a client are told when it creates or drops a database. Delivery
//! is synchronous and happens after the server confirmed the change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEventKind {
    Created,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEvent {
    pub kind: DatabaseEventKind,
    pub url: String,
    pub at: DateTime<Utc>,
}

impl DatabaseEvent {
    pub fn new(kind: DatabaseEventKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            at: Utc::now(),
        }
    }

    pub fn created(url: impl Into<String>) -> Self {
        Self::new(DatabaseEventKind::Created, url)
    }

    pub fn dropped(url: impl Into<String>) -> Self {
        Self::new(DatabaseEventKind::Dropped, url)
    }
}

/// Receives database lifecycle events.
pub trait DatabaseListener: Send + Sync + Debug {
    fn database_changed(&self, event: &DatabaseEvent);
}
