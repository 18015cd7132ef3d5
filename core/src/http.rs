//! HTTP vocabulary shared by requests and responses: methods and the media
//! types that drive body negotiation.

use std::fmt;

/// Content type of urlencoded form bodies.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Content type inferred for requests with an explicit body.
pub const APPLICATION_JSON: &str = "application/json";

pub(crate) const FORM_URLENCODED_PREFIX: &str = "application/x-www-form-urlencoded";
pub(crate) const MULTIPART_PREFIX: &str = "multipart/form-data";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// The upper-case method token sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The lower-cased `type/subtype` of a content type, without parameters.
pub(crate) fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// `true` for JSON and XML media types, which are written by the codec.
pub(crate) fn is_structured(content_type: &str) -> bool {
    let essence = essence(content_type);
    matches!(
        essence.as_str(),
        "application/json" | "application/xml" | "text/xml"
    ) || essence.ends_with("+json")
        || essence.ends_with("+xml")
}

/// The value of a `name=value` parameter of a content type, unquoted.
pub(crate) fn parameter<'a>(content_type: &'a str, name: &str) -> Option<&'a str> {
    content_type.split(';').skip(1).find_map(|p| {
        let (k, v) = p.split_once('=')?;
        k.trim()
            .eq_ignore_ascii_case(name)
            .then(|| v.trim().trim_matches('"'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tokens_are_upper_case() {
        assert_eq!(HttpMethod::Get.as_str(), "GET");
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
    }

    #[test]
    fn structured_types() {
        assert!(is_structured("application/json"));
        assert!(is_structured("Application/JSON; charset=utf-8"));
        assert!(is_structured("application/vnd.api+json"));
        assert!(is_structured("text/xml"));
        assert!(is_structured("application/atom+xml"));
        assert!(!is_structured("application/graphql"));
        assert!(!is_structured("text/plain"));
    }

    #[test]
    fn parameters_are_parsed() {
        assert_eq!(parameter("text/plain; charset=ISO-8859-1", "charset"), Some("ISO-8859-1"));
        assert_eq!(parameter("text/plain; Charset=\"utf-16\"", "charset"), Some("utf-16"));
        assert_eq!(parameter("multipart/form-data; boundary=abc", "boundary"), Some("abc"));
        assert_eq!(parameter("text/plain", "charset"), None);
    }
}
