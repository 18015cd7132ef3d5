//! Blocking [`Transport`] backed by `ureq`.
//!
//! # Design
//! A fresh agent is configured per fetch from the request's timeout and
//! redirect flag. Status codes never become errors here; the response gate
//! lives in `HttpResponse::succeed`. The body is rendered once and the same
//! bytes are resent on every retry attempt.

use std::io::{self, Read};
use std::sync::{Arc, OnceLock};

use fluent_http::{
    with_retries, BufferedResponse, Error, HttpRequest, Result, Transport, TransportResponse,
};
use tracing::debug;
use ureq::http;

/// Redirect limit used when a request follows redirects.
pub const DEFAULT_MAX_REDIRECTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct UreqTransport {
    max_redirects: u32,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect limit for requests that follow redirects.
    pub fn max_redirects(mut self, max_redirects: u32) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    fn agent(&self, request: &HttpRequest) -> ureq::Agent {
        let max_redirects = if request.follows_redirects() {
            self.max_redirects
        } else {
            0
        };
        ureq::Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(max_redirects)
            .max_redirects_will_error(false)
            .timeout_global(request.timeout_duration())
            .build()
            .new_agent()
    }

    fn send(&self, agent: &ureq::Agent, request: &HttpRequest, url: &str, body: &[u8]) -> Result<BufferedResponse> {
        let mut builder = http::Request::builder()
            .method(request.http_method().as_str())
            .uri(url);
        for (name, value) in request.wire_headers() {
            builder = builder.header(name, value);
        }

        let sent = if body.is_empty() {
            agent.run(builder.body(()).map_err(invalid_request)?)
        } else {
            agent.run(builder.body(body).map_err(invalid_request)?)
        };
        let response = sent.map_err(from_ureq)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let mut content = Vec::new();
        response
            .into_body()
            .into_reader()
            .read_to_end(&mut content)
            .map_err(from_body_io)?;

        debug!(status, bytes = content.len(), "received response");
        Ok(BufferedResponse::new(status, headers, content))
    }
}

impl Transport for UreqTransport {
    fn fetch(&self, request: &HttpRequest) -> Result<Box<dyn TransportResponse>> {
        let url = request.url_string()?;
        let body = request.body_bytes()?;
        let agent = self.agent(request);

        let response = with_retries(request.retry_count(), |attempt| {
            debug!(attempt, method = %request.http_method(), %url, "sending request");
            self.send(&agent, request, &url, &body)
        })?;
        Ok(Box::new(response))
    }
}

/// A request bound to a process-wide default [`UreqTransport`].
pub fn request() -> HttpRequest {
    static DEFAULT: OnceLock<Arc<UreqTransport>> = OnceLock::new();
    let transport = DEFAULT.get_or_init(|| Arc::new(UreqTransport::new())).clone();
    HttpRequest::new(transport)
}

fn invalid_request(err: http::Error) -> Error {
    io::Error::new(io::ErrorKind::InvalidInput, err).into()
}

fn from_ureq(err: ureq::Error) -> Error {
    match err {
        ureq::Error::Timeout(which) => {
            io::Error::new(io::ErrorKind::TimedOut, format!("request timed out ({which:?})")).into()
        }
        ureq::Error::Io(e) => e.into(),
        other => io::Error::other(other).into(),
    }
}

/// Body reads surface ureq failures wrapped in an `io::Error`; unwrap them so
/// a timeout keeps its kind.
fn from_body_io(err: io::Error) -> Error {
    let is_ureq_timeout = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<ureq::Error>())
        .is_some_and(|inner| matches!(inner, ureq::Error::Timeout(_)));
    if is_ureq_timeout {
        io::Error::new(io::ErrorKind::TimedOut, err.to_string()).into()
    } else {
        err.into()
    }
}
