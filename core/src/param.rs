//! Parameter values: scalars, lists, binary uploads, and forced-query markers.

use std::fmt;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

/// The value side of a request parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(String),
    /// Expands to one `key=value` pair (or multipart part) per element.
    List(Vec<String>),
    /// A binary upload. Only ever serialized into a multipart body.
    Attachment(BinaryAttachment),
    /// Always rendered into the url query string, even when the request
    /// posts form data.
    ForcedQuery(Box<ParamValue>),
}

impl ParamValue {
    /// Wrap a value so it always lands in the query string. Wrapping twice is
    /// the same as wrapping once.
    pub fn forced_query(value: impl Into<ParamValue>) -> Self {
        match value.into() {
            forced @ ParamValue::ForcedQuery(_) => forced,
            other => ParamValue::ForcedQuery(Box::new(other)),
        }
    }

    pub fn is_forced_query(&self) -> bool {
        matches!(self, ParamValue::ForcedQuery(_))
    }

    /// The value with any forced-query marker removed.
    pub fn strip(&self) -> &ParamValue {
        match self {
            ParamValue::ForcedQuery(inner) => inner.strip(),
            other => other,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Scalar(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Scalar(s)
    }
}

impl From<&String> for ParamValue {
    fn from(s: &String) -> Self {
        ParamValue::Scalar(s.clone())
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        ParamValue::List(v)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(v: Vec<&str>) -> Self {
        ParamValue::List(v.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ParamValue {
    fn from(v: [&str; N]) -> Self {
        ParamValue::List(v.iter().map(|s| s.to_string()).collect())
    }
}

impl From<BinaryAttachment> for ParamValue {
    fn from(a: BinaryAttachment) -> Self {
        ParamValue::Attachment(a)
    }
}

macro_rules! scalar_from_display {
    ($($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    ParamValue::Scalar(v.to_string())
                }
            }
        )*
    };
}

scalar_from_display!(i32, i64, u32, u64, usize, bool, f64);

/// A named parameter, an alternative to the `param(name, value)` setter.
/// A `None` value removes the parameter when applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: String,
    value: Option<ParamValue>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// A parameter that clears `name` when applied.
    pub fn removed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn attachment<R>(
        name: impl Into<String>,
        data: R,
        content_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self
    where
        R: Read + Send + 'static,
    {
        Self::new(name, BinaryAttachment::new(data, content_type, filename))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&ParamValue> {
        self.value.as_ref()
    }

    pub(crate) fn into_parts(self) -> (String, Option<ParamValue>) {
        (self.name, self.value)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}={:?}]", self.name, self.value)
    }
}

type SharedStream = Arc<Mutex<Option<Box<dyn Read + Send>>>>;

/// A single-use binary upload with its own content type and filename.
///
/// Cloning shares the underlying stream: whichever clone is written first
/// consumes it, and later attempts to take it fail.
#[derive(Clone)]
pub struct BinaryAttachment {
    data: SharedStream,
    content_type: String,
    filename: String,
}

impl BinaryAttachment {
    pub fn new<R>(data: R, content_type: impl Into<String>, filename: impl Into<String>) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            data: Arc::new(Mutex::new(Some(Box::new(data)))),
            content_type: content_type.into(),
            filename: filename.into(),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// `true` once the stream has been handed to a writer.
    pub fn is_consumed(&self) -> bool {
        self.data.lock().map(|slot| slot.is_none()).unwrap_or(true)
    }

    /// Take ownership of the stream. Succeeds exactly once.
    pub fn take_data(&self) -> io::Result<Box<dyn Read + Send>> {
        let mut slot = self
            .data
            .lock()
            .map_err(|_| io::Error::other("attachment stream lock poisoned"))?;
        slot.take().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("attachment {:?} already consumed", self.filename),
            )
        })
    }
}

impl PartialEq for BinaryAttachment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
            && self.content_type == other.content_type
            && self.filename == other.filename
    }
}

impl fmt::Debug for BinaryAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryAttachment")
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .field("consumed", &self.is_consumed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn attachment_stream_is_single_use() {
        let a = BinaryAttachment::new(Cursor::new(b"abc".to_vec()), "image/png", "a.png");
        let shared = a.clone();
        assert!(!a.is_consumed());

        let mut data = Vec::new();
        shared.take_data().unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"abc");

        assert!(a.is_consumed());
        let err = a.take_data().err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn forced_query_does_not_nest() {
        let v = ParamValue::forced_query(ParamValue::forced_query("x"));
        assert_eq!(v, ParamValue::ForcedQuery(Box::new(ParamValue::Scalar("x".into()))));
        assert_eq!(v.strip(), &ParamValue::Scalar("x".into()));
    }

    #[test]
    fn conversions() {
        assert_eq!(ParamValue::from(42), ParamValue::Scalar("42".into()));
        assert_eq!(ParamValue::from(true), ParamValue::Scalar("true".into()));
        assert_eq!(
            ParamValue::from(["foo", "bar"]),
            ParamValue::List(vec!["foo".into(), "bar".into()])
        );
    }

    #[test]
    fn removed_param_has_no_value() {
        let p = Param::removed("gone");
        assert_eq!(p.name(), "gone");
        assert!(p.value().is_none());
        assert_eq!(Param::new("a", "b").to_string(), r#"[a=Some(Scalar("b"))]"#);
    }
}
