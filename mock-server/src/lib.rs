//! Echo server for exercising HTTP clients end to end.
//!
//! Every request under `/snoop` is answered with a JSON description of what
//! arrived, so a test can assert on the exact method, url, headers, and body
//! a client put on the wire.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::debug;

/// What the server saw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snoop {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Lower-cased names; repeated headers are joined with `, `.
    pub headers: BTreeMap<String, String>,
    pub content_type: Option<String>,
    /// The request body, lossily decoded as UTF-8.
    pub body: String,
}

/// Requests received by `/slow`, readable at `/slow-hits`.
pub type SlowHits = Arc<AtomicUsize>;

pub fn app() -> Router {
    let hits: SlowHits = Arc::default();
    Router::new()
        .route("/snoop", any(snoop))
        .route("/snoop/{*rest}", any(snoop))
        .route("/status/{code}", any(status))
        .route("/redirect", any(redirect))
        .route("/slow/{millis}", get(slow))
        .route("/slow-hits", get(slow_hits))
        .with_state(hits)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn snoop(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Snoop> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        match seen.get_mut(name.as_str()) {
            Some(joined) => {
                joined.push_str(", ");
                joined.push_str(&value);
            }
            None => {
                seen.insert(name.as_str().to_string(), value.into_owned());
            }
        }
    }
    debug!(%method, %uri, bytes = body.len(), "snoop");
    Json(Snoop {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        content_type: seen.get(header::CONTENT_TYPE.as_str()).cloned(),
        headers: seen,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "invalid status code").into_response(),
    }
}

async fn redirect() -> impl IntoResponse {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, "/snoop/destination")],
    )
}

async fn slow(State(hits): State<SlowHits>, Path(millis): Path<u64>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(millis)).await;
    "done"
}

async fn slow_hits(State(hits): State<SlowHits>) -> String {
    hits.load(Ordering::SeqCst).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snoop_serializes_with_snake_case_fields() {
        let snoop = Snoop {
            method: "POST".to_string(),
            path: "/snoop".to_string(),
            query: None,
            headers: BTreeMap::new(),
            content_type: Some("text/plain".to_string()),
            body: "hi".to_string(),
        };
        let json = serde_json::to_value(&snoop).unwrap();
        assert_eq!(json["content_type"], "text/plain");
        assert_eq!(json["query"], serde_json::Value::Null);
        assert_eq!(json["body"], "hi");
    }

    #[test]
    fn snoop_reads_back_from_json() {
        let snoop: Snoop = serde_json::from_str(
            r#"{"method":"GET","path":"/snoop/x","query":"a=b","headers":{"host":"h"},"content_type":null,"body":""}"#,
        )
        .unwrap();
        assert_eq!(snoop.query.as_deref(), Some("a=b"));
        assert_eq!(snoop.headers["host"], "h");
    }
}
