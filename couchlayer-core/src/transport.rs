//! Transport abstraction for the document database's REST protocol.
//!
//! This module defines the seam between the client logic and the code that actually moves
//! bytes over the network.
//!
//! # Traits
//!
//! - [`Transport`]: performs one HTTP exchange and returns a fully buffered response
//! - [`TransportBuilder`]: factory trait for creating transport instances
//!
//! [`Dispatcher`] pairs a transport with a [`Serializer`] and adds the status checking and
//! response decoding every operation relies on.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::{fmt, sync::Arc};
use tracing::debug;
use url::Url;

use crate::{
    error::{CouchError, CouchResult, ErrorInfo},
    serializer::{Serializer, SerializerExt},
};

/// HTTP methods used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Head,
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Head => "HEAD",
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An owned HTTP request.
#[derive(Debug, Clone)]
pub struct CouchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl CouchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn head(url: Url) -> Self {
        Self::new(Method::Head, url)
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn put(url: Url) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn delete(url: Url) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attaches a body together with its `Content-Type` header.
    pub fn with_body(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.headers.push(("Content-Type".to_string(), content_type.to_string()));
        self.body = Some(body);
        self
    }

    /// Looks up a header value, ignoring the case of the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone, Default)]
pub struct CouchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CouchResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Looks up a header value, ignoring the case of the name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs HTTP exchanges against the document database.
///
/// Implementations must be safe to share between concurrently running batch actions and
/// must release any connection they used before `execute` returns, on every path.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request` and returns the buffered response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`CouchError::Transport`] when no response could be obtained and
    /// [`CouchError::Closed`] after [`Transport::shutdown`].
    async fn execute(&self, request: CouchRequest) -> CouchResult<CouchResponse>;

    /// Releases pooled resources. Later calls to `execute` fail with [`CouchError::Closed`].
    ///
    /// The default implementation is a no-op.
    async fn shutdown(&self) -> CouchResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn execute(&self, request: CouchRequest) -> CouchResult<CouchResponse> {
        (**self).execute(request).await
    }

    async fn shutdown(&self) -> CouchResult<()> {
        (**self).shutdown().await
    }
}

#[async_trait]
impl<T> Transport for &T
where
    T: Transport + ?Sized,
{
    async fn execute(&self, request: CouchRequest) -> CouchResult<CouchResponse> {
        (**self).execute(request).await
    }

    async fn shutdown(&self) -> CouchResult<()> {
        (**self).shutdown().await
    }
}

#[async_trait]
pub trait TransportBuilder {
    type Transport: Transport;

    async fn build(self) -> CouchResult<Self::Transport>;
}

/// A transport paired with the serializer used to encode requests and decode responses.
///
/// Cheap to clone; clones share the same transport.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn Serializer>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            transport,
            serializer,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    /// Sends `request`, labelling transport failures with `context`.
    pub async fn execute(&self, request: CouchRequest, context: &str) -> CouchResult<CouchResponse> {
        let method = request.method;
        let url = request.url.to_string();
        debug!(%method, %url, "sending request");

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| e.with_context(context))?;

        debug!(%method, %url, status = response.status, "received response");
        Ok(response)
    }

    /// Sends `request` and fails with [`CouchError::StatusMismatch`] unless the response
    /// status equals `expected`.
    pub async fn execute_expect_status(
        &self,
        request: CouchRequest,
        expected: u16,
        context: &str,
    ) -> CouchResult<CouchResponse> {
        let url = request.url.to_string();
        let response = self.execute(request, context).await?;

        if response.status != expected {
            return Err(self.status_error(context, &url, expected, &response));
        }

        Ok(response)
    }

    /// Sends `request` and decodes a `T` from a `200 OK` body.
    ///
    /// A `404` becomes [`CouchError::NotFound`]; any other status becomes
    /// [`CouchError::StatusMismatch`]. A body that does not decode as `T` is a
    /// [`CouchError::Serialization`] error, never an empty success.
    pub async fn execute_with_decoding<T: DeserializeOwned>(
        &self,
        request: CouchRequest,
        context: &str,
    ) -> CouchResult<T> {
        let url = request.url.to_string();
        let response = self.execute(request, context).await?;

        match response.status {
            200 => self.serializer.decode(&response.body),
            404 => Err(CouchError::NotFound { url }),
            _ => Err(self.status_error(context, &url, 200, &response)),
        }
    }

    /// Builds the error for an unexpected status, decoding the server's error payload.
    pub fn status_error(
        &self,
        context: &str,
        url: &str,
        expected: u16,
        response: &CouchResponse,
    ) -> CouchError {
        CouchError::StatusMismatch {
            context: context.to_string(),
            url: url.to_string(),
            expected,
            info: ErrorInfo::new(response.status, self.serializer.parse_error(&response.body)),
        }
    }
}
