//! Explicit request payloads.
//!
//! A `Body` is the `body` object of a request. How it is written depends on
//! the resolved content type; see `HttpRequest::write_body`.

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::Value;

type SharedReader = Arc<Mutex<Option<Box<dyn Read + Send>>>>;

/// The payload of a request that is not built from form parameters.
#[derive(Clone)]
pub enum Body {
    /// Written verbatim.
    Bytes(Bytes),
    /// Copied through verbatim. Single use, like an attachment.
    Stream(SharedReader),
    /// Encoded with the charset of the content type, or by the codec when the
    /// content type is JSON or XML.
    Text(String),
    /// Encoded by the request's codec.
    Json(Value),
}

impl Body {
    /// A streaming body. The reader is consumed by the first write.
    pub fn stream<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Body::Stream(Arc::new(Mutex::new(Some(Box::new(reader)))))
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Body::Bytes(_) => "bytes",
            Body::Stream(_) => "stream",
            Body::Text(_) => "text",
            Body::Json(_) => "json",
        }
    }

    pub(crate) fn take_stream(reader: &SharedReader) -> io::Result<Box<dyn Read + Send>> {
        let mut slot = reader
            .lock()
            .map_err(|_| io::Error::other("body stream lock poisoned"))?;
        slot.take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "body stream already consumed"))
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(b) => f.debug_tuple("Body::Bytes").field(&b.len()).finish(),
            Body::Stream(_) => f.write_str("Body::Stream"),
            Body::Text(s) => f.debug_tuple("Body::Text").field(s).finish(),
            Body::Json(v) => f.debug_tuple("Body::Json").field(v).finish(),
        }
    }
}

impl PartialEq for Body {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Body::Bytes(a), Body::Bytes(b)) => a == b,
            (Body::Stream(a), Body::Stream(b)) => Arc::ptr_eq(a, b),
            (Body::Text(a), Body::Text(b)) => a == b,
            (Body::Json(a), Body::Json(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(v: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Body {
    fn from(v: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(v))
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<Value> for Body {
    fn from(v: Value) -> Self {
        Body::Json(v)
    }
}
