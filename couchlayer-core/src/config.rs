//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MAX_CONNECTIONS: usize = 20;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_WORKERS: usize = 20;

/// Tuning knobs shared by the client and its transports.
///
/// Every field has a default, so partial configurations deserialize:
///
/// ```ignore
/// let config: ClientConfig = serde_json::from_str(r#"{ "max_connections": 8 }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum number of requests in flight at once, and of idle pooled connections per host.
    pub max_connections: usize,
    /// How long an idle pooled connection is kept before it is closed.
    pub idle_timeout: Duration,
    /// Deadline for a single HTTP exchange.
    pub request_timeout: Duration,
    /// Length of one slice of the batch wait. Progress is logged after each slice.
    pub poll_interval: Duration,
    /// Overall limit on the batch wait. `None` waits until every action has reported.
    pub batch_timeout: Option<Duration>,
    /// Maximum number of batch actions running at once.
    pub max_workers: usize,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            batch_timeout: None,
            max_workers: DEFAULT_MAX_WORKERS,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_batch_timeout(mut self, batch_timeout: Option<Duration>) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_configuration_falls_back_to_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "max_connections": 8, "user_agent": "batch-loader" }"#)
                .unwrap();
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
        assert_eq!(config.batch_timeout, None);
        assert_eq!(config.user_agent.as_deref(), Some("batch-loader"));
    }

    #[test]
    fn limits_never_drop_to_zero() {
        let config = ClientConfig::default().with_max_connections(0).with_max_workers(0);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.max_workers, 1);
    }
}
