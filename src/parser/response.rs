//! HTTP response types and utilities.

use std::str::FromStr;

use serde::Serialize;

use crate::parser::error::Error;
use crate::parser::headers::Headers;
use crate::parser::request::split_head;
use crate::parser::status::StatusCode;
use crate::parser::version::HttpVersion;

/// Represents an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    version: HttpVersion,
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Create a new HTTP/1.1 response with the given status code.
    pub fn new(status: StatusCode) -> Self {
        let mut headers = Headers::new();
        headers.put("Server".to_string(), "microhttp-rs".to_string());

        Self {
            version: HttpVersion::Http11,
            status,
            headers,
            body: Vec::new(),
        }
    }

    /// A `text/plain` response with the given body.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Self::new(status);
        response.headers.put("Content-Type".to_string(), "text/plain".to_string());
        response.with_body_string(body)
    }

    /// An `application/json` response with `value` serialized as the body.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, Error> {
        Self::new(status).with_json(value)
    }

    pub fn with_version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    /// Add or replace a header.
    ///
    /// Fails with [`Error::InvalidArgument`] for an empty name or a name or
    /// value that would break the header line.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Result<Self, Error> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    /// Set the content type.
    pub fn with_content_type(self, content_type: impl Into<String>) -> Result<Self, Error> {
        self.with_header("Content-Type", content_type)
    }

    /// Set the response body with a string.
    pub fn with_body_string(self, body: impl Into<String>) -> Self {
        self.with_body(body.into().into_bytes())
    }

    /// Set the response body with bytes and update `Content-Length`.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.headers.put("Content-Length".to_string(), self.body.len().to_string());
        self
    }

    /// Set the response body with a JSON value.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        let json = serde_json::to_vec(value)?;
        self.headers.put("Content-Type".to_string(), "application/json".to_string());
        Ok(self.with_body(json))
    }

    /// Drop a header, if present.
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// Add a header whose name and value are known to be well formed.
    pub(crate) fn with_trusted_header(mut self, name: &str, value: &str) -> Self {
        self.headers.put(name.to_string(), value.to_string());
        self
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Convert the response to bytes: status line, headers, blank line, body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128 + self.body.len());
        bytes.extend_from_slice(format!("{} {}\r\n", self.version, self.status).as_bytes());
        self.headers.write_to(&mut bytes);
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

/// Parse an HTTP response from a byte slice.
///
/// The status line must hold a version, a known status code and a reason
/// phrase. The reason phrase is normalised to the canonical one for the code.
pub fn parse_response(input: &[u8]) -> Result<HttpResponse, Error> {
    let (head, body) = split_head(input)?;
    let mut lines = head.lines();

    let status_line = lines.next().ok_or(Error::EmptyMessage)?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();
    if parts.len() != 3 || parts.iter().any(|part| part.trim().is_empty()) {
        return Err(Error::MalformedStartLine(status_line.to_string()));
    }

    let version = HttpVersion::from_str(parts[0])?;
    let code = parts[1]
        .parse::<u16>()
        .map_err(|_| Error::InvalidStatusCode(parts[1].to_string()))?;
    let status = StatusCode::try_from(code)?;
    let headers = Headers::parse_lines(lines)?;

    Ok(HttpResponse {
        version,
        status,
        headers,
        body: body.to_vec(),
    })
}
