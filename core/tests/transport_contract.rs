//! Dispatch behavior against an in-memory transport.
//!
//! # Design
//! `MockTransport` records every physical attempt and answers from a script,
//! so retry accounting, hook ordering, and the bytes handed to a transport can
//! be checked without a network.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use fluent_http::{
    with_retries, BufferedResponse, Error, HttpRequest, HttpResponse, JsonCodec, Result,
    Transport, TransportResponse,
};
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
struct Sent {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

#[derive(Debug)]
struct MockTransport {
    attempts: AtomicUsize,
    sent: Mutex<Vec<Sent>>,
    script: fn(usize) -> Result<BufferedResponse>,
}

impl MockTransport {
    fn new(script: fn(usize) -> Result<BufferedResponse>) -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            script,
        })
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn fetch(&self, request: &HttpRequest) -> Result<Box<dyn TransportResponse>> {
        let url = request.url_string()?;
        let body = request.body_bytes()?;
        let response = with_retries(request.retry_count(), |_| {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(Sent {
                method: request.http_method().to_string(),
                url: url.clone(),
                headers: request.wire_headers(),
                body: body.clone(),
            });
            (self.script)(n)
        })?;
        Ok(Box::new(response))
    }
}

fn timeout() -> Error {
    io::Error::new(io::ErrorKind::TimedOut, "mock timeout").into()
}

fn ok_json(_: usize) -> Result<BufferedResponse> {
    Ok(BufferedResponse::new(
        200,
        vec![("Content-Type".to_string(), "application/json".to_string())],
        r#"{"ok":true}"#,
    ))
}

fn always_timeout(_: usize) -> Result<BufferedResponse> {
    Err(timeout())
}

fn two_timeouts_then_ok(n: usize) -> Result<BufferedResponse> {
    if n < 2 {
        Err(timeout())
    } else {
        ok_json(n)
    }
}

fn refused(_: usize) -> Result<BufferedResponse> {
    Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused").into())
}

// --- retry accounting ---

#[test]
fn every_attempt_times_out_exactly_n_plus_one_times() {
    for retries in [0u32, 1, 3] {
        let transport = MockTransport::new(always_timeout);
        let err = HttpRequest::new(transport.clone())
            .url("http://x.com")
            .post()
            .param("a", "b")
            .retries(retries)
            .fetch()
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(transport.attempts(), retries as usize + 1);
    }
}

#[test]
fn each_attempt_resends_identical_bytes() {
    let transport = MockTransport::new(always_timeout);
    let _ = HttpRequest::new(transport.clone())
        .url("http://x.com")
        .post()
        .param("a", "b")
        .retries(2)
        .fetch();

    let sent = transport.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|s| s == &sent[0]));
    assert_eq!(sent[0].body, b"a=b");
}

#[test]
fn recovers_after_transient_timeouts() {
    let transport = MockTransport::new(two_timeouts_then_ok);
    let response = HttpRequest::new(transport.clone())
        .url("http://x.com")
        .retries(5)
        .fetch()
        .unwrap();

    assert_eq!(response.status().unwrap(), 200);
    assert_eq!(transport.attempts(), 3);
}

#[test]
fn non_timeout_failures_are_not_retried() {
    let transport = MockTransport::new(refused);
    let err = HttpRequest::new(transport.clone())
        .url("http://x.com")
        .retries(5)
        .fetch()
        .unwrap_err();

    assert!(err.is_io());
    assert!(!err.is_timeout());
    assert_eq!(transport.attempts(), 1);
}

// --- what reaches the transport ---

#[test]
fn transport_sees_routed_url_and_headers() {
    let transport = MockTransport::new(ok_json);
    HttpRequest::new(transport.clone())
        .url("http://x.com/")
        .path("/api")
        .post()
        .param("foo", "bar")
        .query_param("foo2", "bar2")
        .header("X-Key", "k")
        .fetch()
        .unwrap();

    let sent = &transport.sent()[0];
    assert_eq!(sent.method, "POST");
    assert_eq!(sent.url, "http://x.com/api?foo2=bar2");
    assert_eq!(sent.body, b"foo=bar");
    assert_eq!(
        sent.headers,
        vec![
            ("X-Key".to_string(), "k".to_string()),
            (
                "Content-Type".to_string(),
                "application/x-www-form-urlencoded; charset=utf-8".to_string()
            ),
        ]
    );
}

#[test]
fn json_params_are_compact_json_in_the_query() {
    let transport = MockTransport::new(ok_json);
    HttpRequest::new(transport.clone())
        .url("http://x.com")
        .param_json("filter", &json!({"foo": "bar"}))
        .unwrap()
        .fetch()
        .unwrap();

    assert_eq!(
        transport.sent()[0].url,
        "http://x.com?filter=%7B%22foo%22%3A%22bar%22%7D"
    );
}

#[test]
fn body_conflict_is_reported_before_dispatch() {
    let transport = MockTransport::new(ok_json);
    let err = HttpRequest::new(transport.clone())
        .url("http://x.com")
        .post()
        .content_type("application/x-www-form-urlencoded")
        .param("a", "b")
        .body("raw")
        .fetch()
        .unwrap_err();

    assert!(matches!(err, Error::BodyConflict { .. }));
    assert_eq!(transport.attempts(), 0);
}

// --- hooks ---

#[test]
fn preflight_can_override_headers() {
    let transport = MockTransport::new(ok_json);
    let template = HttpRequest::new(transport.clone())
        .url("http://x.com")
        .header("Authorization", "stale")
        .preflight(|r| r.header("Authorization", "fresh"));

    template.fetch().unwrap();

    assert_eq!(
        transport.sent()[0].headers[0],
        ("Authorization".to_string(), "fresh".to_string())
    );
    assert_eq!(
        template.header_values().get("Authorization").map(String::as_str),
        Some("stale")
    );
}

#[test]
fn hooks_compose_in_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let (o1, o2, o3, o4) = (order.clone(), order.clone(), order.clone(), order.clone());

    HttpRequest::new(MockTransport::new(ok_json))
        .url("http://x.com")
        .preflight(move |r| {
            o1.lock().unwrap().push("pre1");
            r
        })
        .preflight_and_then(move |r| {
            o2.lock().unwrap().push("pre2");
            r
        })
        .postflight(move |r| {
            o3.lock().unwrap().push("post1");
            r
        })
        .postflight_and_then(move |r| {
            o4.lock().unwrap().push("post2");
            r
        })
        .fetch()
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["pre1", "pre2", "post1", "post2"]);
}

#[test]
fn postflight_can_replace_the_response() {
    let response = HttpRequest::new(MockTransport::new(ok_json))
        .url("http://x.com")
        .postflight(|r| {
            assert_eq!(r.status().unwrap(), 200);
            HttpResponse::new(
                Box::new(BufferedResponse::new(503, vec![], "maintenance")),
                Arc::new(JsonCodec),
                None,
            )
        })
        .fetch()
        .unwrap();

    assert_eq!(response.succeed().unwrap_err().status(), Some(503));
}

#[test]
fn error_translator_reaches_the_response() {
    #[derive(Debug, thiserror::Error)]
    #[error("service unavailable")]
    struct Unavailable;

    fn unavailable(_: usize) -> Result<BufferedResponse> {
        Ok(BufferedResponse::new(503, vec![], ""))
    }

    let err = HttpRequest::new(MockTransport::new(unavailable))
        .url("http://x.com")
        .error_translator(|_| Error::translated(Unavailable))
        .fetch()
        .unwrap()
        .as_value()
        .unwrap_err();

    assert_eq!(err.to_string(), "service unavailable");
}

// --- sharing ---

#[test]
fn templates_are_shared_across_threads() {
    let transport = MockTransport::new(ok_json);
    let template = HttpRequest::new(transport.clone())
        .url("http://x.com")
        .header("X-App", "demo");

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let template = template.clone();
            thread::spawn(move || template.path("items").param("id", i).fetch().map(|_| ()))
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }

    let mut urls: Vec<String> = transport.sent().into_iter().map(|s| s.url).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://x.com/items?id=0",
            "http://x.com/items?id=1",
            "http://x.com/items?id=2",
            "http://x.com/items?id=3",
        ]
    );
    assert!(template.param_values().is_empty());
}

#[test]
fn requests_and_responses_cross_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_send<T: Send>() {}
    assert_send_sync::<HttpRequest>();
    assert_send::<HttpResponse>();
}

// --- debug capture ---

#[derive(Clone, Default)]
struct SharedLog(Arc<Mutex<Vec<u8>>>);

impl Write for SharedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedLog {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn with_debug_logging<T>(f: impl FnOnce() -> T) -> (T, String) {
    let log = SharedLog::default();
    let writer = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, log.contents())
}

#[test]
fn debug_logging_captures_the_body_without_changing_it() {
    let request = HttpRequest::new(MockTransport::new(ok_json))
        .post()
        .param("greeting", "hello world");

    let (bytes, log) = with_debug_logging(|| request.body_bytes().unwrap());

    assert_eq!(bytes, b"greeting=hello+world");
    assert!(log.contains("wrote body"), "{log}");
    assert!(log.contains("greeting=hello+world"), "{log}");
}

#[test]
fn debug_log_shows_only_the_start_of_large_bodies() {
    let text = format!("{}END", "x".repeat(2000));
    let request = HttpRequest::new(MockTransport::new(ok_json))
        .post()
        .content_type("text/plain")
        .body(text.clone());

    let (bytes, log) = with_debug_logging(|| request.body_bytes().unwrap());

    assert_eq!(bytes, text.as_bytes());
    assert!(log.contains(&"x".repeat(1024)));
    assert!(!log.contains("END"));
}

#[test]
fn fetch_is_logged_at_debug() {
    let request = HttpRequest::new(MockTransport::new(ok_json)).url("http://x.com/logged");
    let (result, log) = with_debug_logging(|| request.fetch().map(|_| ()));

    result.unwrap();
    assert!(log.contains("fetching"), "{log}");
    assert!(log.contains("http://x.com/logged"), "{log}");
}
