//! The result of a fetch.
//!
//! Accessors named `as_*` first check the status code through `succeed()`,
//! while `content_*` accessors read the body regardless of status.

use std::cell::OnceCell;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::{self, Codec};
use crate::error::{Error, HttpException, Result};
use crate::headers::Headers;
use crate::request::ErrorTranslator;
use crate::transport::TransportResponse;

/// A response as seen by the caller.
pub struct HttpResponse {
    inner: Box<dyn TransportResponse>,
    codec: Arc<dyn Codec>,
    translator: Option<ErrorTranslator>,
    headers: OnceCell<Headers>,
}

impl HttpResponse {
    pub fn new(
        inner: Box<dyn TransportResponse>,
        codec: Arc<dyn Codec>,
        translator: Option<ErrorTranslator>,
    ) -> Self {
        Self {
            inner,
            codec,
            translator,
            headers: OnceCell::new(),
        }
    }

    pub fn status(&self) -> Result<u16> {
        Ok(self.inner.status()?)
    }

    /// Response headers, read from the transport on first use.
    pub fn headers(&self) -> Result<&Headers> {
        if let Some(headers) = self.headers.get() {
            return Ok(headers);
        }
        let parsed = Headers::from_pairs(self.inner.headers()?);
        Ok(self.headers.get_or_init(|| parsed))
    }

    pub fn location(&self) -> Result<Option<&str>> {
        Ok(self.headers()?.first("Location"))
    }

    pub fn content_type(&self) -> Result<Option<&str>> {
        Ok(self.headers()?.first("Content-Type"))
    }

    pub fn content_stream(&self) -> Result<Box<dyn Read + Send>> {
        Ok(self.inner.content_stream()?)
    }

    pub fn content_bytes(&self) -> Result<Bytes> {
        Ok(self.inner.content_bytes()?)
    }

    /// The body as text, replacing invalid UTF-8. No status check.
    pub fn content_string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.content_bytes()?).into_owned())
    }

    /// The body decoded with the named charset. No status check.
    pub fn content_string_with(&self, charset: &str) -> Result<String> {
        let encoding = encoding_rs::Encoding::for_label(charset.as_bytes())
            .ok_or_else(|| Error::UnsupportedCharset(charset.to_string()))?;
        let bytes = self.content_bytes()?;
        let (text, _, _) = encoding.decode(&bytes);
        Ok(text.into_owned())
    }

    /// Decode the body with the codec. No status check.
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.codec.decode(&self.content_bytes()?)?;
        Ok(codec::from_value(value)?)
    }

    /// `Ok(self)` when the status is in [200, 400), otherwise the
    /// `HttpException`, or whatever the error translator maps it to.
    pub fn succeed(self) -> Result<Self> {
        self.check()?;
        Ok(self)
    }

    fn check(&self) -> Result<()> {
        let code = self.status()?;
        if (200..400).contains(&code) {
            return Ok(());
        }
        let exception = HttpException::new(code, self.headers()?.clone(), self.content_bytes()?);
        Err(match &self.translator {
            Some(translate) => translate(exception),
            None => Error::Http(exception),
        })
    }

    pub fn as_json<T: DeserializeOwned>(&self) -> Result<T> {
        self.check()?;
        self.content_as()
    }

    pub fn as_value(&self) -> Result<Value> {
        self.check()?;
        Ok(self.codec.decode(&self.content_bytes()?)?)
    }

    pub fn as_stream(&self) -> Result<Box<dyn Read + Send>> {
        self.check()?;
        self.content_stream()
    }

    pub fn as_bytes(&self) -> Result<Bytes> {
        self.check()?;
        self.content_bytes()
    }

    /// The body as UTF-8 text, replacing invalid sequences.
    pub fn as_string(&self) -> Result<String> {
        self.check()?;
        self.content_string()
    }

    /// The body decoded with the named charset (any WHATWG encoding label).
    pub fn as_string_with(&self, charset: &str) -> Result<String> {
        self.check()?;
        self.content_string_with(charset)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.inner.status().ok())
            .field("headers", &self.headers.get())
            .finish_non_exhaustive()
    }
}
