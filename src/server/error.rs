//! Error types for the HTTP server.

use thiserror::Error;

use crate::parser::{Error as ParserError, HttpResponse, Method, StatusCode};

/// Errors that can occur during HTTP server operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Error parsing an HTTP request.
    #[error("Parse error: {0}")]
    ParseError(#[from] ParserError),

    /// A body-bearing request arrived without a `Content-Length` header.
    #[error("Missing Content-Length for {0} request")]
    MissingLength(Method),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// No route template matches the requested path.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No route is registered for the request method.
    #[error("Method {0} not allowed for path: {1}")]
    MethodNotAllowed(Method, String),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    InternalError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// The status the error is reported to the client with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::ParseError(_) | Error::MissingLength(_) => StatusCode::BadRequest,
            Error::NotFound(_) => StatusCode::NotFound,
            Error::MethodNotAllowed(_, _) => StatusCode::MethodNotAllowed,
            Error::IoError(_) | Error::InternalError(_) | Error::JsonError(_) => {
                StatusCode::InternalServerError
            }
        }
    }

    /// Render the error as a plain-text response.
    ///
    /// Client errors echo their diagnostic; server errors get a generic body.
    pub fn to_response(&self) -> HttpResponse {
        let status = self.status();
        let body = match status {
            StatusCode::InternalServerError => status.reason_phrase().to_string(),
            _ => self.to_string(),
        };
        HttpResponse::text(status, body)
    }
}
