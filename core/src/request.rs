//! The immutable request builder.
//!
//! # Design
//! `HttpRequest` is a plain value. Every mutator borrows `self` and returns a
//! modified copy; the parameter and header maps, hooks, codec, and transport
//! sit behind `Arc`s, so a copy shares everything it did not change and a
//! changed map is cloned on write. A request can therefore be stored as a
//! template and specialized freely from many threads.
//!
//! The request also decides how its parameters travel. The resolved content
//! type (explicit, else inferred from the body, the method, and the presence
//! of attachments) routes each parameter either into the url query string or
//! into a urlencoded or multipart body.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, enabled, Level};

use crate::body::Body;
use crate::codec::{self, Codec, JsonCodec};
use crate::error::{CodecError, Error, HttpException, Result};
use crate::http::{self, HttpMethod, APPLICATION_JSON, FORM_URLENCODED};
use crate::multipart::{self, MultipartWriter};
use crate::param::{BinaryAttachment, Param, ParamValue};
use crate::query::QueryBuilder;
use crate::response::HttpResponse;
use crate::transport::Transport;

/// Transform applied to a request immediately before dispatch.
pub type Preflight = Arc<dyn Fn(HttpRequest) -> HttpRequest + Send + Sync>;

/// Transform applied to a response immediately after dispatch.
pub type Postflight = Arc<dyn Fn(HttpResponse) -> HttpResponse + Send + Sync>;

/// Maps a protocol failure to the error returned by `succeed()`.
pub type ErrorTranslator = Arc<dyn Fn(HttpException) -> Error + Send + Sync>;

/// Longest body preview written to the debug log.
const BODY_LOG_LIMIT: usize = 1024;

/// Immutable definition of a request.
#[derive(Clone)]
pub struct HttpRequest {
    transport: Arc<dyn Transport>,
    method: HttpMethod,
    url: Option<String>,
    params: Arc<IndexMap<String, ParamValue>>,
    headers: Arc<IndexMap<String, String>>,
    content_type: Option<String>,
    body: Option<Body>,
    timeout: Duration,
    retries: u32,
    follow_redirects: bool,
    preflight: Option<Preflight>,
    postflight: Option<Postflight>,
    codec: Arc<dyn Codec>,
    error_translator: Option<ErrorTranslator>,
    boundary: Arc<str>,
}

impl HttpRequest {
    /// A GET request with no url, bound to `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            method: HttpMethod::Get,
            url: None,
            params: Arc::default(),
            headers: Arc::default(),
            content_type: None,
            body: None,
            timeout: Duration::ZERO,
            retries: 0,
            follow_redirects: true,
            preflight: None,
            postflight: None,
            codec: Arc::new(JsonCodec),
            error_translator: None,
            boundary: multipart::random_boundary().into(),
        }
    }

    fn with(&self, f: impl FnOnce(&mut HttpRequest)) -> HttpRequest {
        let mut next = self.clone();
        f(&mut next);
        next
    }

    // -----------------------------------------------------------------------
    // Method and url
    // -----------------------------------------------------------------------

    pub fn method(&self, method: HttpMethod) -> Self {
        self.with(|r| r.method = method)
    }

    pub fn get(&self) -> Self {
        self.method(HttpMethod::Get)
    }

    pub fn post(&self) -> Self {
        self.method(HttpMethod::Post)
    }

    pub fn put(&self) -> Self {
        self.method(HttpMethod::Put)
    }

    pub fn delete(&self) -> Self {
        self.method(HttpMethod::Delete)
    }

    pub fn patch(&self) -> Self {
        self.method(HttpMethod::Patch)
    }

    /// Replace the url wholesale.
    pub fn url(&self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.with(|r| r.url = Some(url))
    }

    /// Append a path segment with exactly one `/` between the current url and
    /// the segment. Without a url, the segment becomes the url.
    pub fn path(&self, segment: &str) -> Self {
        let url = match &self.url {
            None => segment.to_string(),
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                segment.trim_start_matches('/')
            ),
        };
        self.url(url)
    }

    // -----------------------------------------------------------------------
    // Parameters
    // -----------------------------------------------------------------------

    /// Set or replace a parameter. A replaced parameter keeps its position.
    pub fn param(&self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        let name = name.into();
        let value = value.into();
        self.with(|r| r.set_param(name, Some(value)))
    }

    /// Set a parameter, or remove it when `value` is `None`.
    pub fn param_opt<V: Into<ParamValue>>(&self, name: impl Into<String>, value: Option<V>) -> Self {
        let name = name.into();
        let value = value.map(Into::into);
        self.with(|r| r.set_param(name, value))
    }

    pub fn without_param(&self, name: &str) -> Self {
        self.with(|r| r.set_param(name.to_string(), None))
    }

    /// Apply several parameters in order.
    pub fn params(&self, params: impl IntoIterator<Item = Param>) -> Self {
        self.with(|r| {
            for p in params {
                let (name, value) = p.into_parts();
                r.set_param(name, value);
            }
        })
    }

    /// Set a parameter that is always sent in the url query string, even when
    /// the other parameters are posted as form data.
    pub fn query_param(&self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.param(name, ParamValue::forced_query(value))
    }

    /// Add a binary upload. Switches the method to POST.
    pub fn param_attachment<R>(
        &self,
        name: impl Into<String>,
        data: R,
        content_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self
    where
        R: io::Read + Send + 'static,
    {
        let attachment = BinaryAttachment::new(data, content_type, filename);
        self.post().param(name, attachment)
    }

    /// Set a parameter to the codec encoding of `value`.
    pub fn param_json<T: Serialize + ?Sized>(&self, name: impl Into<String>, value: &T) -> Result<Self> {
        let encoded = self.codec.encode(&codec::to_value(value)?)?;
        let text = String::from_utf8(encoded)
            .map_err(|e| CodecError::with_source("codec produced non utf-8 text", e))?;
        Ok(self.param(name, text))
    }

    fn set_param(&mut self, name: String, value: Option<ParamValue>) {
        match value {
            Some(value) => {
                if matches!(value, ParamValue::Attachment(_)) {
                    self.boundary = multipart::random_boundary().into();
                }
                Arc::make_mut(&mut self.params).insert(name, value);
            }
            None => {
                if self.params.contains_key(&name) {
                    Arc::make_mut(&mut self.params).shift_remove(&name);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Headers and payload
    // -----------------------------------------------------------------------

    /// Set or replace a header. The value is sent as given. A `Content-Type`
    /// header (any casing) sets the content type instead.
    pub fn header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if name.eq_ignore_ascii_case("content-type") {
            return self.content_type(value);
        }
        let value = value.into();
        self.with(|r| {
            Arc::make_mut(&mut r.headers).insert(name, value);
        })
    }

    /// Set the `Authorization` header for HTTP basic auth.
    pub fn basic_auth(&self, username: &str, password: &str) -> Self {
        let credentials = BASE64.encode(format!("{username}:{password}"));
        self.header("Authorization", format!("Basic {credentials}"))
    }

    /// Override the inferred content type.
    pub fn content_type(&self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        self.with(|r| r.content_type = Some(content_type))
    }

    /// Set an explicit payload. A body cannot be combined with form or
    /// multipart parameters; that is reported when the body is written.
    pub fn body(&self, body: impl Into<Body>) -> Self {
        let body = body.into();
        self.with(|r| r.body = Some(body))
    }

    /// Set an explicit payload from any serializable value.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<Self> {
        Ok(self.body(Body::Json(codec::to_value(value)?)))
    }

    // -----------------------------------------------------------------------
    // Dispatch options
    // -----------------------------------------------------------------------

    /// Connect/read timeout. `Duration::ZERO` leaves the transport default.
    pub fn timeout(&self, timeout: Duration) -> Self {
        self.with(|r| r.timeout = timeout)
    }

    /// Number of retries after a timeout. 0 disables retrying.
    pub fn retries(&self, retries: u32) -> Self {
        self.with(|r| r.retries = retries)
    }

    pub fn follow_redirects(&self, follow: bool) -> Self {
        self.with(|r| r.follow_redirects = follow)
    }

    pub fn codec(&self, codec: Arc<dyn Codec>) -> Self {
        self.with(|r| r.codec = codec)
    }

    pub fn transport(&self, transport: Arc<dyn Transport>) -> Self {
        self.with(|r| r.transport = transport)
    }

    pub fn error_translator<F>(&self, translate: F) -> Self
    where
        F: Fn(HttpException) -> Error + Send + Sync + 'static,
    {
        let translate: ErrorTranslator = Arc::new(translate);
        self.with(|r| r.error_translator = Some(translate))
    }

    /// Replace the preflight hook.
    pub fn preflight<F>(&self, f: F) -> Self
    where
        F: Fn(HttpRequest) -> HttpRequest + Send + Sync + 'static,
    {
        let f: Preflight = Arc::new(f);
        self.with(|r| r.preflight = Some(f))
    }

    /// Run `f` after the current preflight hook.
    pub fn preflight_and_then<F>(&self, f: F) -> Self
    where
        F: Fn(HttpRequest) -> HttpRequest + Send + Sync + 'static,
    {
        match self.preflight.clone() {
            Some(prev) => self.preflight(move |req| f(prev(req))),
            None => self.preflight(f),
        }
    }

    /// Replace the postflight hook.
    pub fn postflight<F>(&self, f: F) -> Self
    where
        F: Fn(HttpResponse) -> HttpResponse + Send + Sync + 'static,
    {
        let f: Postflight = Arc::new(f);
        self.with(|r| r.postflight = Some(f))
    }

    /// Run `f` after the current postflight hook.
    pub fn postflight_and_then<F>(&self, f: F) -> Self
    where
        F: Fn(HttpResponse) -> HttpResponse + Send + Sync + 'static,
    {
        match self.postflight.clone() {
            Some(prev) => self.postflight(move |resp| f(prev(resp))),
            None => self.postflight(f),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn http_method(&self) -> HttpMethod {
        self.method
    }

    /// The url without any query-routed parameters.
    pub fn base_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn param_values(&self) -> &IndexMap<String, ParamValue> {
        &self.params
    }

    /// Explicit headers, excluding the content type.
    pub fn header_values(&self) -> &IndexMap<String, String> {
        &self.headers
    }

    pub fn payload(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// The requested timeout, or `None` for the transport default.
    pub fn timeout_duration(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    /// The requested timeout in milliseconds; 0 means the transport default.
    pub fn timeout_millis(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn retry_count(&self) -> u32 {
        self.retries
    }

    pub fn follows_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn codec_ref(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn is_post(&self) -> bool {
        self.method == HttpMethod::Post
    }

    fn has_binary_attachments(&self) -> bool {
        self.params
            .values()
            .any(|v| matches!(v, ParamValue::Attachment(_)))
    }

    /// The content type sent with this request, or `None` (e.g. a plain GET).
    pub fn resolved_content_type(&self) -> Option<Cow<'_, str>> {
        if let Some(ct) = &self.content_type {
            let needs_boundary = http::essence(ct) == http::MULTIPART_PREFIX
                && http::parameter(ct, "boundary").is_none();
            if needs_boundary {
                Some(Cow::Owned(format!("{ct}; boundary={}", self.boundary)))
            } else {
                Some(Cow::Borrowed(ct))
            }
        } else if self.body.is_some() {
            Some(Cow::Borrowed(APPLICATION_JSON))
        } else if self.is_post() && self.has_binary_attachments() {
            Some(Cow::Owned(multipart::content_type_for(&self.boundary)))
        } else if self.is_post() {
            Some(Cow::Borrowed(FORM_URLENCODED))
        } else {
            None
        }
    }

    /// Headers to put on the wire: the explicit headers followed by the
    /// resolved `Content-Type`, if any.
    pub fn wire_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(ct) = self.resolved_content_type() {
            headers.push(("Content-Type".to_string(), ct.into_owned()));
        }
        headers
    }

    fn routes_params_to_body(&self) -> bool {
        self.resolved_content_type().is_some_and(|ct| {
            let essence = http::essence(&ct);
            essence.starts_with(http::FORM_URLENCODED_PREFIX)
                || essence.starts_with(http::MULTIPART_PREFIX)
        })
    }

    fn query_params(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        let to_body = self.routes_params_to_body();
        self.params
            .iter()
            .filter(move |(_, v)| !to_body || v.is_forced_query())
            .map(|(k, v)| (k.as_str(), v))
    }

    fn body_params(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params
            .iter()
            .filter(|(_, v)| !v.is_forced_query())
            .map(|(k, v)| (k.as_str(), v))
    }

    /// The query string of the url-routed parameters, empty when none.
    pub fn query_string(&self) -> String {
        self.query_params().collect::<QueryBuilder>().build()
    }

    /// The complete url including url-routed parameters.
    pub fn url_string(&self) -> Result<String> {
        let base = self.url.as_deref().ok_or(Error::MissingUrl)?;
        let query = self.query_string();
        if query.is_empty() {
            Ok(base.to_string())
        } else {
            let sep = if base.contains('?') { '&' } else { '?' };
            Ok(format!("{base}{sep}{query}"))
        }
    }

    // -----------------------------------------------------------------------
    // Body serialization
    // -----------------------------------------------------------------------

    /// Write the request body, if any, into `out` and return the number of
    /// bytes written. When debug logging is enabled the written bytes are also
    /// captured and logged.
    pub fn write_body<W: Write + ?Sized>(&self, out: &mut W) -> Result<u64> {
        if enabled!(Level::DEBUG) {
            let mut capture = Vec::new();
            let written = self.write_body_captured(out, Some(&mut capture))?;
            if !capture.is_empty() {
                let shown = &capture[..capture.len().min(BODY_LOG_LIMIT)];
                debug!(bytes = written, body = %String::from_utf8_lossy(shown), "wrote body");
            }
            Ok(written)
        } else {
            self.write_body_captured(out, None)
        }
    }

    /// Write the request body into `out`, mirroring every byte into
    /// `capture` when one is given. `capture` never affects what `out` gets.
    pub fn write_body_captured<W: Write + ?Sized>(
        &self,
        out: &mut W,
        capture: Option<&mut Vec<u8>>,
    ) -> Result<u64> {
        let mut sink = BodySink { out, capture };
        let written = self.dispatch_body(&mut sink)?;
        sink.flush()?;
        Ok(written)
    }

    /// Render the body into memory once, so a transport can resend the same
    /// bytes on every attempt.
    pub fn body_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_body(&mut buf)?;
        Ok(buf)
    }

    fn dispatch_body<W: Write + ?Sized>(&self, sink: &mut BodySink<'_, W>) -> Result<u64> {
        let content_type = self.resolved_content_type();
        let essence = content_type.as_deref().map(http::essence).unwrap_or_default();

        if essence.starts_with(http::MULTIPART_PREFIX) {
            self.reject_body(&essence)?;
            let boundary = content_type
                .as_deref()
                .and_then(|ct| http::parameter(ct, "boundary"))
                .unwrap_or(&*self.boundary)
                .to_string();
            let written = MultipartWriter::new(sink, boundary).write(self.body_params())?;
            return Ok(written);
        }

        if essence.starts_with(http::FORM_URLENCODED_PREFIX) {
            self.reject_body(&essence)?;
            let form = self.body_params().collect::<QueryBuilder>().build();
            sink.write_all(form.as_bytes())?;
            return Ok(form.len() as u64);
        }

        let Some(body) = &self.body else {
            return Ok(0);
        };
        let content_type = content_type.unwrap_or(Cow::Borrowed(APPLICATION_JSON));

        match body {
            Body::Bytes(bytes) => {
                sink.write_all(bytes)?;
                Ok(bytes.len() as u64)
            }
            Body::Stream(reader) => {
                let mut reader = Body::take_stream(reader)?;
                let copied = io::copy(&mut reader, sink)?;
                debug!(bytes = copied, "copied body stream");
                Ok(copied)
            }
            Body::Json(value) if http::is_structured(&content_type) => self.write_encoded(sink, value),
            Body::Text(text) if http::is_structured(&content_type) => {
                self.write_encoded(sink, &Value::String(text.clone()))
            }
            Body::Text(text) => {
                let bytes = encode_text(text, &content_type)?;
                sink.write_all(&bytes)?;
                Ok(bytes.len() as u64)
            }
            Body::Json(_) => Err(Error::UnsupportedPayload {
                body_type: body.type_name(),
                content_type: content_type.into_owned(),
            }),
        }
    }

    fn write_encoded<W: Write + ?Sized>(&self, sink: &mut BodySink<'_, W>, value: &Value) -> Result<u64> {
        let bytes = self.codec.encode(value)?;
        sink.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    fn reject_body(&self, content_type: &str) -> Result<()> {
        if self.body.is_some() {
            return Err(Error::BodyConflict {
                content_type: content_type.to_string(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Apply the preflight hook, send the request through the transport, and
    /// apply the postflight hook to the response.
    pub fn fetch(&self) -> Result<HttpResponse> {
        let request = match &self.preflight {
            Some(preflight) => preflight(self.clone()),
            None => self.clone(),
        };

        let url = request.url_string()?;
        debug!(method = %request.method, %url, "fetching");

        let raw = request.transport.fetch(&request)?;
        let response = HttpResponse::new(raw, request.codec.clone(), request.error_translator.clone());

        Ok(match &request.postflight {
            Some(postflight) => postflight(response),
            None => response,
        })
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("follow_redirects", &self.follow_redirects)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// Encode text with the charset named by the content type, UTF-8 by default.
fn encode_text(text: &str, content_type: &str) -> Result<Vec<u8>> {
    let Some(label) = http::parameter(content_type, "charset") else {
        return Ok(text.as_bytes().to_vec());
    };
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| Error::UnsupportedCharset(label.to_string()))?;
    let (bytes, _, _) = encoding.encode(text);
    Ok(bytes.into_owned())
}

/// The primary output plus an optional capture buffer.
struct BodySink<'a, W: Write + ?Sized> {
    out: &'a mut W,
    capture: Option<&'a mut Vec<u8>>,
}

impl<W: Write + ?Sized> Write for BodySink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.out.write(buf)?;
        if let Some(capture) = self.capture.as_deref_mut() {
            capture.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
