//! Error types for request building, dispatch, and response decoding.
//!
//! # Design
//! Every failure surfaces as one `Error` value. Callers that only use the raw
//! response accessors see I/O-kind failures (`Io`, `Decode`); callers that opt
//! into the success gate (`succeed()`, `as_*`) additionally see `Http`, which
//! carries the status, headers, and body of the failed exchange. Body contract
//! violations are deterministic and never retried.

use std::fmt;
use std::io;

use bytes::Bytes;

use crate::headers::Headers;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A `Result` alias where the `Err` case is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by request dispatch and response handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Sending or receiving failed: connection refused, malformed URL, a
    /// stream copy failure, or a timeout.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The codec could not encode or decode a payload.
    #[error("decode error: {0}")]
    Decode(#[from] CodecError),

    /// The exchange completed but the status code is outside [200, 400).
    #[error(transparent)]
    Http(#[from] HttpException),

    /// A `body` was supplied together with form or multipart parameters.
    #[error("cannot combine an explicit body with {content_type} parameters")]
    BodyConflict { content_type: String },

    /// The body could not be serialized for the resolved content type.
    #[error("unsupported payload: {body_type} body cannot be written as {content_type}")]
    UnsupportedPayload {
        body_type: &'static str,
        content_type: String,
    },

    /// A text body asked for a charset that has no known encoder.
    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// `fetch()` was called before a url was set.
    #[error("request has no url")]
    MissingUrl,

    /// An `HttpException` mapped to a caller-defined error by an error translator.
    #[error(transparent)]
    Translated(BoxError),
}

impl Error {
    /// Returns `true` for transport and decode failures.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Decode(_))
    }

    /// Returns `true` if the underlying I/O failure was a timeout. Transports
    /// retry only on these.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::TimedOut)
    }

    /// Returns `true` for protocol failures raised by the success gate.
    pub fn is_http(&self) -> bool {
        matches!(self, Error::Http(_))
    }

    /// The status code of a protocol failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Wrap a caller-defined error, typically from an error translator.
    pub fn translated<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Translated(err.into())
    }
}

/// Failure reported by a [`Codec`](crate::codec::Codec).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CodecError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::with_source(e.to_string(), e)
    }
}

// ---------------------------------------------------------------------------
// HttpException
// ---------------------------------------------------------------------------

/// Longest text body echoed into a message. JSON and XML are not restricted.
const MAX_TEXT_MSG_LENGTH: usize = 500;

/// A completed exchange whose status code is not a success.
///
/// The message is `"<code>: <summary>"`, where the summary depends on the
/// response content type: text is truncated, JSON and XML pass through
/// verbatim, and anything else is described by its size.
#[derive(Clone)]
pub struct HttpException {
    code: u16,
    headers: Headers,
    content: Bytes,
    message: String,
}

impl HttpException {
    pub fn new(code: u16, headers: Headers, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let message = format!("{code}: {}", summarize(&headers, &content));
        Self {
            code,
            headers,
            content,
            message,
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn content_string(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpException")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("content_len", &self.content.len())
            .finish()
    }
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpException {}

fn summarize(headers: &Headers, content: &[u8]) -> String {
    match headers.first("Content-Type") {
        None => match std::str::from_utf8(content) {
            Ok(text) => chop_to(text, MAX_TEXT_MSG_LENGTH),
            Err(_) => format!("Body of {} bytes, not utf-8", content.len()),
        },
        Some(content_type) => {
            let lowercase = content_type.to_ascii_lowercase();
            if lowercase.starts_with("text") {
                chop_to(&String::from_utf8_lossy(content), MAX_TEXT_MSG_LENGTH)
            } else if lowercase.starts_with("application/json")
                || lowercase.starts_with("application/xml")
            {
                String::from_utf8_lossy(content).into_owned()
            } else {
                format!("Error body of type {content_type}, {} bytes", content.len())
            }
        }
    }
}

/// Cut a string down to `max` characters, ending in an ellipsis when cut.
fn chop_to(original: &str, max: usize) -> String {
    if original.chars().count() > max {
        let mut chopped: String = original.chars().take(max - 1).collect();
        chopped.push('\u{2026}');
        chopped
    } else {
        original.to_string()
    }
}
