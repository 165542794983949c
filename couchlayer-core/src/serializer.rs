//! The serializer boundary.
//!
//! The client never encodes documents or decodes responses directly; it goes through a
//! [`Serializer`], which turns JSON values into request bytes, response bytes back into JSON
//! values, and error bodies into [`ErrorBody`]. [`JsonSerializer`] is the default.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};
use std::fmt::Debug;

use crate::error::{CouchResult, ErrorBody};

/// Content type sent with every JSON request body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Encodes and decodes wire bodies.
pub trait Serializer: Send + Sync + Debug {
    /// Encodes a JSON value as a request body.
    fn serialize(&self, value: &Value) -> CouchResult<Vec<u8>>;

    /// Decodes a response body into a JSON value.
    fn deserialize(&self, body: &[u8]) -> CouchResult<Value>;

    /// Parses a structured error body. Returns `None` for an empty body.
    fn parse_error(&self, body: &[u8]) -> Option<ErrorBody>;

    /// Content type of the bodies produced by [`Serializer::serialize`].
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }
}

/// Typed helpers over any [`Serializer`].
///
/// This trait is automatically implemented for all serializers, including trait objects.
pub trait SerializerExt: Serializer {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CouchResult<Vec<u8>> {
        self.serialize(&to_value(value)?)
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> CouchResult<T> {
        Ok(from_value(self.deserialize(body)?)?)
    }
}

impl<S: Serializer + ?Sized> SerializerExt for S {}

/// Default [`Serializer`] backed by `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> CouchResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize(&self, body: &[u8]) -> CouchResult<Value> {
        Ok(serde_json::from_slice(body)?)
    }

    fn parse_error(&self, body: &[u8]) -> Option<ErrorBody> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .or_else(|| Some(ErrorBody::from_text(String::from_utf8_lossy(body).trim())))
    }
}
