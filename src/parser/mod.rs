//! HTTP message model.
//!
//! This module provides parsing and serialization for HTTP/1.1 requests and
//! responses. It performs no I/O.

mod error;
mod headers;
mod method;
mod request;
mod response;
mod status;
mod version;

// Re-export public items
pub use error::Error;
pub use headers::Headers;
pub use method::Method;
pub use request::{parse_request, HttpRequest};
pub use response::{parse_response, HttpResponse};
pub use status::StatusCode;
pub use version::HttpVersion;

pub(crate) use request::HEAD_TERMINATOR;
