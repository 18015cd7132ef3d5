//! Payload codec used for JSON/XML bodies, JSON params, and response decoding.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::CodecError;

/// Converts between a structured value and its wire bytes.
///
/// Implementations report every failure as a [`CodecError`]; callers see it
/// as [`Error::Decode`](crate::Error::Decode).
pub trait Codec: Send + Sync + fmt::Debug {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Compact JSON via `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CodecError> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, CodecError> {
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_codec_encodes_compactly() {
        let bytes = JsonCodec.encode(&json!({"foo": "bar"})).unwrap();
        assert_eq!(bytes, br#"{"foo":"bar"}"#);
    }

    #[test]
    fn json_codec_rejects_garbage() {
        let err = JsonCodec.decode(b"not json").unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
