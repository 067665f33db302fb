//! Error types for the shop API client.
//!
//! # Design
//! `ApiError` is the single error surfaced to callers. Network failures,
//! decoding failures and unexpected HTTP statuses are separate variants so a
//! caller can tell "the server was unreachable" from "the server answered with
//! something we could not read." A 401 is not special-cased: it arrives as a
//! plain `HttpError` like any other unexpected status.

use thiserror::Error;

/// Errors returned by `ShopClient` and the `ShopApi` parse methods.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404, the requested resource does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The request could not reach the server, even after the automatic retry.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The response body could not be decoded into the expected type.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The on-disk response cache could not be opened.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The client configuration is incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The background task running the request panicked.
    #[error("request task failed: {0}")]
    TaskFailed(String),
}

/// Failures of the underlying HTTP transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The TCP/TLS connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// A connect, send or receive timeout elapsed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The connection broke while the request was in flight.
    #[error("I/O error: {0}")]
    Io(String),

    /// The request or response violated HTTP (bad URL, malformed headers).
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// Connection-level failures get one automatic retry; protocol errors
    /// would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Protocol(_))
    }
}

/// JSON that could not be turned into a domain value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The input is not well-formed JSON.
    #[error("malformed JSON: {0}")]
    Syntax(String),

    /// The JSON is well-formed but its shape does not match the target type.
    #[error("unexpected shape: {0}")]
    Shape(String),

    /// A date string matched none of the known formats.
    #[error("unparseable date: {0:?}")]
    Date(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match e.classify() {
            Category::Syntax | Category::Eof | Category::Io => DecodeError::Syntax(e.to_string()),
            Category::Data => DecodeError::Shape(e.to_string()),
        }
    }
}

/// Errors opening or maintaining the on-disk response cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on cache directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Missing or invalid client configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_classify_as_syntax() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(DecodeError::from(err), DecodeError::Syntax(_)));
    }

    #[test]
    fn type_mismatches_classify_as_shape() {
        let err = serde_json::from_str::<Vec<u32>>(r#"{"a":1}"#).unwrap_err();
        assert!(matches!(DecodeError::from(err), DecodeError::Shape(_)));
    }

    #[test]
    fn decode_error_is_distinct_from_network_error() {
        let decode: ApiError = DecodeError::Date("yesterday".into()).into();
        let network: ApiError = TransportError::Connect("refused".into()).into();
        assert!(matches!(decode, ApiError::Decode(_)));
        assert!(matches!(network, ApiError::Network(_)));
    }

    #[test]
    fn only_connection_failures_are_retryable() {
        assert!(TransportError::Connect("refused".into()).is_retryable());
        assert!(TransportError::Timeout("read".into()).is_retryable());
        assert!(TransportError::Io("reset".into()).is_retryable());
        assert!(!TransportError::Protocol("bad uri".into()).is_retryable());
    }

    #[test]
    fn http_error_display_includes_status() {
        let err = ApiError::HttpError {
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "HTTP 401: unauthorized");
    }
}
