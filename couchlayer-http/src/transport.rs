//! HTTP transport backed by a pooled `reqwest` client.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use couchlayer_core::{
    config::ClientConfig,
    error::{CouchError, CouchResult},
    transport::{CouchRequest, CouchResponse, Method, Transport, TransportBuilder},
};

const REQUEST_FAILED: &str = "HTTP request failed";

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Head => reqwest::Method::HEAD,
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// [`Transport`] talking to a real server over HTTP.
///
/// All requests share one connection pool. At most `max_connections` requests are in flight
/// at once; further requests wait for a free slot. Idle pooled connections are closed after
/// `idle_timeout`.
///
/// Every response body is read completely before `execute` returns (`HEAD` responses have
/// none), so the connection goes back to the pool on every path.
///
/// # Example
///
/// ```ignore
/// use couchlayer_http::HttpTransport;
/// use couchlayer_core::transport::TransportBuilder;
///
/// let transport = HttpTransport::builder()
///     .max_connections(8)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Arc<RwLock<Option<reqwest::Client>>>,
    connections: Arc<Semaphore>,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// Whether [`Transport::shutdown`] has been called.
    pub async fn is_closed(&self) -> bool {
        self.client.read().await.is_none()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: CouchRequest) -> CouchResult<CouchResponse> {
        let _permit = self
            .connections
            .acquire()
            .await
            .map_err(|_| CouchError::Closed)?;
        let client = self.client.read().await.clone().ok_or(CouchError::Closed)?;

        let url = request.url.to_string();
        let method = request.method;

        let mut builder = client.request(to_reqwest(method), request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CouchError::transport(REQUEST_FAILED, &url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = if method == Method::Head {
            Vec::new()
        } else {
            response
                .bytes()
                .await
                .map_err(|e| CouchError::transport(REQUEST_FAILED, &url, e))?
                .to_vec()
        };

        debug!(%method, url = %url, status, bytes = body.len(), "completed HTTP exchange");
        Ok(CouchResponse {
            status,
            headers,
            body,
        })
    }

    async fn shutdown(&self) -> CouchResult<()> {
        if self.client.write().await.take().is_some() {
            self.connections.close();
            info!("HTTP transport shut down");
        }
        Ok(())
    }
}

/// Builder for [`HttpTransport`].
#[derive(Debug, Clone, Default)]
pub struct HttpTransportBuilder {
    config: ClientConfig,
}

impl HttpTransportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the connection settings from a client configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.config = self.config.with_max_connections(max_connections);
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.config = self.config.with_idle_timeout(idle_timeout);
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config = self.config.with_request_timeout(request_timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config = self.config.with_user_agent(user_agent);
        self
    }
}

#[async_trait]
impl TransportBuilder for HttpTransportBuilder {
    type Transport = HttpTransport;

    async fn build(self) -> CouchResult<Self::Transport> {
        let config = self.config;
        let max_connections = config.max_connections.max(1);

        let mut builder = reqwest::Client::builder()
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(max_connections)
            .timeout(config.request_timeout);

        if let Some(agent) = config.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder
            .build()
            .map_err(|e| CouchError::Initialization(format!("Failed to build HTTP client: {e}")))?;

        debug!(max_connections, "built HTTP transport");
        Ok(HttpTransport {
            client: Arc::new(RwLock::new(Some(client))),
            connections: Arc::new(Semaphore::new(max_connections)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes() {
        let transport = HttpTransport::builder().build().await.unwrap();
        assert!(!transport.is_closed().await);

        transport.shutdown().await.unwrap();
        transport.shutdown().await.unwrap();
        assert!(transport.is_closed().await);

        let request = CouchRequest::get(reqwest::Url::parse("http://127.0.0.1:9/db").unwrap());
        assert!(matches!(transport.execute(request).await, Err(CouchError::Closed)));
    }

    #[test]
    fn maps_every_method() {
        assert_eq!(to_reqwest(Method::Head), reqwest::Method::HEAD);
        assert_eq!(to_reqwest(Method::Delete), reqwest::Method::DELETE);
    }
}
