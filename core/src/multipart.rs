//! `multipart/form-data` body serialization.
//!
//! Parts are framed with a per-request boundary and CRLF line endings. Field
//! names and filenames are written as quoted strings with backslash and
//! double-quote escaped; unlike the urlencoded path they are never
//! percent-encoded. Attachment bytes are copied raw, without a
//! `Content-Transfer-Encoding` header.

use std::io::{self, Write};

use uuid::Uuid;

use crate::param::{BinaryAttachment, ParamValue};

const BOUNDARY_PREFIX: &str = "----fluent-http-boundary-";
const CRLF: &[u8] = b"\r\n";

/// A fresh, unguessable boundary token.
pub fn random_boundary() -> String {
    format!("{BOUNDARY_PREFIX}{}", Uuid::new_v4().simple())
}

/// The `Content-Type` header value announcing `boundary`.
pub fn content_type_for(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}

/// Escape a value for use inside a quoted header parameter.
pub fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Writes a parameter list as a multipart body into `out`.
pub struct MultipartWriter<'a, W: Write + ?Sized> {
    out: &'a mut W,
    boundary: String,
    written: u64,
}

impl<'a, W: Write + ?Sized> MultipartWriter<'a, W> {
    pub fn new(out: &'a mut W, boundary: impl Into<String>) -> Self {
        Self {
            out,
            boundary: boundary.into(),
            written: 0,
        }
    }

    /// A writer with a freshly generated boundary.
    pub fn random(out: &'a mut W) -> Self {
        Self::new(out, random_boundary())
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        content_type_for(&self.boundary)
    }

    /// Write every parameter followed by the closing boundary. Returns the
    /// number of bytes written.
    ///
    /// Attachment streams are consumed; an attachment that was already
    /// consumed fails the write.
    pub fn write<'p, I>(mut self, params: I) -> io::Result<u64>
    where
        I: IntoIterator<Item = (&'p str, &'p ParamValue)>,
    {
        for (name, value) in params {
            self.write_value(name, value)?;
        }
        let end = format!("--{}--", self.boundary);
        self.line(end.as_bytes())?;
        self.out.flush()?;
        Ok(self.written)
    }

    fn write_value(&mut self, name: &str, value: &ParamValue) -> io::Result<()> {
        match value {
            ParamValue::Scalar(v) => self.write_text_part(name, v),
            ParamValue::List(values) => {
                for v in values {
                    self.write_text_part(name, v)?;
                }
                Ok(())
            }
            ParamValue::Attachment(a) => self.write_attachment_part(name, a),
            ParamValue::ForcedQuery(inner) => self.write_value(name, inner),
        }
    }

    fn write_text_part(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.separator()?;
        let disposition = format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quoted(name)
        );
        self.line(disposition.as_bytes())?;
        self.line(b"")?;
        self.line(value.as_bytes())
    }

    fn write_attachment_part(&mut self, name: &str, attachment: &BinaryAttachment) -> io::Result<()> {
        let mut data = attachment.take_data()?;
        self.separator()?;
        let disposition = format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
            escape_quoted(name),
            escape_quoted(attachment.filename())
        );
        self.line(disposition.as_bytes())?;
        let content_type = format!("Content-Type: {}", attachment.content_type());
        self.line(content_type.as_bytes())?;
        self.line(b"")?;
        self.written += io::copy(&mut data, &mut *self.out)?;
        self.line(b"")
    }

    fn separator(&mut self) -> io::Result<()> {
        let sep = format!("--{}", self.boundary);
        self.line(sep.as_bytes())
    }

    fn line(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.out.write_all(bytes)?;
        self.out.write_all(CRLF)?;
        self.written += (bytes.len() + CRLF.len()) as u64;
        Ok(())
    }
}
