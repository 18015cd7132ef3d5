//! Fluent, immutable HTTP request builder.
//!
//! # Overview
//! Builds `HttpRequest` values through chained mutators that never modify the
//! receiver, then `fetch()`es them through a pluggable [`Transport`]. The core
//! decides where parameters travel (url query, urlencoded form, or multipart
//! body), which content type to send, and how to serialize an explicit body.
//! It performs no network I/O itself; a transport crate does the round trip.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use fluent_http::{HttpRequest, Transport};
//! # fn demo(transport: Arc<dyn Transport>) -> fluent_http::Result<()> {
//! let api = HttpRequest::new(transport).url("https://api.example.com");
//! let user: serde_json::Value = api.path("users").param("id", 7).fetch()?.as_json()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//! - Requests are cheap persistent values: maps, hooks, codec, and transport
//!   are shared behind `Arc` and cloned only on write.
//! - Parameter values are a tagged [`ParamValue`]; wrapping one in
//!   `ForcedQuery` pins it to the url regardless of content type.
//! - Transports share [`with_retries`], so only timeouts are retried and every
//!   backend counts attempts the same way.
//! - Responses gate on status [200, 400) in `succeed()` and the `as_*`
//!   accessors; `content_*` accessors do not.

pub mod body;
pub mod codec;
pub mod error;
pub mod headers;
pub mod http;
pub mod multipart;
pub mod param;
pub mod query;
pub mod request;
pub mod response;
pub mod transport;

pub use body::Body;
pub use codec::{Codec, JsonCodec};
pub use error::{CodecError, Error, HttpException, Result};
pub use headers::Headers;
pub use http::{HttpMethod, APPLICATION_JSON, FORM_URLENCODED};
pub use multipart::MultipartWriter;
pub use param::{BinaryAttachment, Param, ParamValue};
pub use query::QueryBuilder;
pub use request::{ErrorTranslator, HttpRequest, Postflight, Preflight};
pub use response::HttpResponse;
pub use transport::{with_retries, BufferedResponse, Transport, TransportResponse};
