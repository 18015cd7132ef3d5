//! `application/x-www-form-urlencoded` query strings.
//!
//! Keys and values are encoded with the form-urlencoded byte serializer:
//! UTF-8, space becomes `+`, alphanumerics and `*-._` pass through, and every
//! other byte becomes an upper-case `%XX` escape. The same encoding is used for
//! url query strings and urlencoded request bodies.

use tracing::warn;

use crate::param::ParamValue;

/// Percent-encode one query component.
pub fn url_encode(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Builds an `&`-joined query string in insertion order.
#[derive(Debug, Default, Clone)]
pub struct QueryBuilder {
    buf: String,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key` with `value`. Lists add one pair per element; forced-query
    /// markers are stripped. Attachments cannot be expressed in a query
    /// string and are skipped.
    pub fn add(&mut self, key: &str, value: &ParamValue) -> &mut Self {
        match value.strip() {
            ParamValue::Scalar(v) => self.add_pair(key, v),
            ParamValue::List(values) => {
                for v in values {
                    self.add_pair(key, v);
                }
            }
            ParamValue::Attachment(a) => {
                warn!(param = key, filename = a.filename(), "attachment skipped in query string");
            }
            ParamValue::ForcedQuery(_) => unreachable!("strip() removes every marker"),
        }
        self
    }

    fn add_pair(&mut self, key: &str, value: &str) {
        if !self.buf.is_empty() {
            self.buf.push('&');
        }
        self.buf.extend(form_urlencoded::byte_serialize(key.as_bytes()));
        self.buf.push('=');
        self.buf.extend(form_urlencoded::byte_serialize(value.as_bytes()));
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn build(self) -> String {
        self.buf
    }
}

impl<'a> FromIterator<(&'a str, &'a ParamValue)> for QueryBuilder {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a ParamValue)>>(iter: I) -> Self {
        let mut q = QueryBuilder::new();
        for (k, v) in iter {
            q.add(k, v);
        }
        q
    }
}
