//! Error types for the HTTP message model.

use thiserror::Error;

use crate::parser::method::Method;

/// Errors that can occur while parsing or building an HTTP message.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP method in the request is not supported.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The start line has fewer (or more) tokens than expected.
    #[error("Malformed start line: {0}")]
    MalformedStartLine(String),

    /// The HTTP version in the message is not supported.
    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    /// The status code in a response is not a known code.
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(String),

    /// A header line has no `": "` separator.
    #[error("Invalid header format: {0}")]
    InvalidHeaderFormat(String),

    /// The message head is not valid UTF-8.
    #[error("Message head is not valid UTF-8")]
    InvalidUtf8,

    /// The message is empty.
    #[error("Empty message")]
    EmptyMessage,

    /// The `Content-Length` header is not a non-negative integer.
    #[error("Invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// A body was supplied for a method that never carries one.
    #[error("{0} requests cannot carry a body")]
    UnexpectedBody(Method),

    /// A builder was given a value that cannot be serialized.
    #[error("Invalid argument for {0}")]
    InvalidArgument(&'static str),

    /// A required header is missing from the request.
    #[error("Required header is missing: {0}")]
    MissingHeader(String),

    /// Error parsing JSON.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error describes wire input that could not be parsed.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::InvalidMethod(_)
                | Error::MalformedStartLine(_)
                | Error::InvalidVersion(_)
                | Error::InvalidStatusCode(_)
                | Error::InvalidHeaderFormat(_)
                | Error::InvalidUtf8
                | Error::EmptyMessage
                | Error::InvalidContentLength(_)
                | Error::UnexpectedBody(_)
        )
    }
}
