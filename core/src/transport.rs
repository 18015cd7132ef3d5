//! The boundary between the request model and the code that does the I/O.
//!
//! # Design
//! The core never touches the network. A `Transport` receives a fully built
//! `HttpRequest`, performs the exchange (honoring the request's timeout,
//! retry budget, and redirect flag), and hands back a `TransportResponse`.
//! Backends share the retry loop in [`with_retries`] so the retry contract
//! is identical everywhere.

use std::fmt;
use std::io::{self, Cursor, Read};

use bytes::Bytes;
use tracing::warn;

use crate::error::Result;
use crate::request::HttpRequest;

/// A backend that physically sends a request.
///
/// `fetch` blocks until a response or a final failure is available. It must
/// write the request body once per physical attempt using
/// [`HttpRequest::write_body`] or reuse the bytes of
/// [`HttpRequest::body_bytes`], and it must retry only timeout failures.
pub trait Transport: Send + Sync + fmt::Debug {
    fn fetch(&self, request: &HttpRequest) -> Result<Box<dyn TransportResponse>>;
}

/// The raw result of an exchange as delivered by a transport.
pub trait TransportResponse: Send {
    fn status(&self) -> io::Result<u16>;

    fn content_stream(&self) -> io::Result<Box<dyn Read + Send>>;

    fn content_bytes(&self) -> io::Result<Bytes>;

    /// Header name/value pairs in arrival order; a repeated header appears
    /// once per value. May be called more than once.
    fn headers(&self) -> io::Result<Vec<(String, String)>>;
}

/// A response whose body has already been read into memory.
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl BufferedResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }
}

impl TransportResponse for BufferedResponse {
    fn status(&self) -> io::Result<u16> {
        Ok(self.status)
    }

    fn content_stream(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.body.clone())))
    }

    fn content_bytes(&self) -> io::Result<Bytes> {
        Ok(self.body.clone())
    }

    fn headers(&self) -> io::Result<Vec<(String, String)>> {
        Ok(self.headers.clone())
    }
}

/// Run `attempt` up to `retries + 1` times.
///
/// Only timeout failures are retried; any other error is returned
/// immediately. When every attempt times out, the last failure is returned.
/// Attempts are sequential and numbered from 0.
pub fn with_retries<T, F>(retries: u32, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut n = 0;
    loop {
        match attempt(n) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_timeout() && n < retries => {
                warn!(attempt = n, retries, "timeout error, retrying");
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
