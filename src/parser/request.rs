//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::str::FromStr;

use memchr::memmem;
use serde::de::DeserializeOwned;

use crate::parser::error::Error;
use crate::parser::headers::Headers;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// The blank line between the message head and the body.
pub(crate) const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Represents an HTTP request.
///
/// A request is immutable once built: the builder methods consume it and hand
/// back an updated value, failing instead of producing a request that could
/// not be written back to the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    method: Method,
    target: String,
    version: HttpVersion,
    headers: Headers,
    body: Vec<u8>,
    query_params: HashMap<String, String>,
}

impl HttpRequest {
    /// Create a new HTTP/1.1 request with no headers and an empty body.
    ///
    /// # Arguments
    ///
    /// * `method` - The HTTP method
    /// * `target` - The request target: a path and an optional query string
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let query_params = parse_query(&target);
        Self {
            method,
            target,
            version: HttpVersion::Http11,
            headers: Headers::new(),
            body: Vec::new(),
            query_params,
        }
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

    /// Set the body and its `Content-Length`.
    ///
    /// Fails with [`Error::UnexpectedBody`] when the method never carries a
    /// body and `body` is not empty.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Result<Self, Error> {
        let body = body.into();
        if !self.method.allows_body() && !body.is_empty() {
            return Err(Error::UnexpectedBody(self.method));
        }
        self.headers.put("Content-Length".to_string(), body.len().to_string());
        self.body = body;
        Ok(self)
    }

    /// Attach body bytes framed by the already present `Content-Length`.
    pub(crate) fn attach_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// The raw request target, including any query string.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The path component of the target.
    pub fn path(&self) -> &str {
        self.target.split_once('?').map_or(self.target.as_str(), |(path, _)| path)
    }

    /// The query string, without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Get a header value (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains(name)
    }

    /// The advertised body length.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when there is no `Content-Length` header, or an error if the
    /// header is not a plain run of decimal digits that fits in a `usize`.
    pub fn content_length(&self) -> Result<Option<usize>, Error> {
        self.get_header("Content-Length")
            .map(|value| {
                let digits = value.trim();
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::InvalidContentLength(value.to_string()));
                }
                digits
                    .parse::<usize>()
                    .map_err(|_| Error::InvalidContentLength(value.to_string()))
            })
            .transpose()
    }

    /// Whether the connection should be closed after the response.
    ///
    /// HTTP/1.1 keeps the connection open unless the client sends
    /// `Connection: close`; HTTP/1.0 closes it unless the client sends
    /// `Connection: keep-alive`.
    pub fn wants_close(&self) -> bool {
        match (self.version, self.get_header("Connection")) {
            (_, Some(value)) if value.eq_ignore_ascii_case("close") => true,
            (HttpVersion::Http10, Some(value)) => !value.eq_ignore_ascii_case("keep-alive"),
            (HttpVersion::Http10, None) => true,
            (HttpVersion::Http11, _) => false,
        }
    }

    /// Parse the request body as JSON.
    ///
    /// # Returns
    ///
    /// The parsed JSON value, or an error if the body is not valid JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        if !self.is_json() {
            return Err(Error::MissingHeader("Content-Type: application/json".to_string()));
        }
        let json = serde_json::from_slice(&self.body)?;
        Ok(json)
    }

    /// Check if the Content-Type header is application/json.
    pub fn is_json(&self) -> bool {
        self.get_header("Content-Type")
            .is_some_and(|content_type| content_type.starts_with("application/json"))
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get a query parameter value.
    pub fn get_query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    pub fn has_query_param(&self, name: &str) -> bool {
        self.query_params.contains_key(name)
    }

    /// Serialize the request: request line, headers, blank line, body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + self.target.len() + self.body.len());
        bytes.extend_from_slice(format!("{} {} {}\r\n", self.method, self.target, self.version).as_bytes());
        self.headers.write_to(&mut bytes);
        bytes.extend_from_slice(b"\r\n");
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn parse_query(target: &str) -> HashMap<String, String> {
    target
        .split_once('?')
        .map(|(_, query)| {
            query
                .split('&')
                .filter(|s| !s.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Split a raw message at the first blank line.
///
/// Without a blank line the whole input is treated as the head.
pub(crate) fn split_head(input: &[u8]) -> Result<(&str, &[u8]), Error> {
    let (head, body) = match memmem::find(input, HEAD_TERMINATOR) {
        Some(index) => (&input[..index], &input[index + HEAD_TERMINATOR.len()..]),
        None => (input, &input[input.len()..]),
    };
    let head = std::str::from_utf8(head).map_err(|_| Error::InvalidUtf8)?;
    if head.trim().is_empty() {
        return Err(Error::EmptyMessage);
    }
    Ok((head, body))
}

/// Parse an HTTP request from a byte slice.
///
/// # Arguments
///
/// * `input` - A byte slice containing the HTTP request to parse
///
/// # Returns
///
/// The parsed HTTP request, or an error if the request is invalid
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, Error> {
    let (head, body) = split_head(input)?;
    let mut lines = head.lines();

    let request_line = lines.next().ok_or(Error::EmptyMessage)?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(Error::MalformedStartLine(request_line.to_string()));
    }

    let method = Method::from_str(parts[0])?;
    let version = HttpVersion::from_str(parts[2])?;
    let headers = Headers::parse_lines(lines)?;

    if !method.allows_body() && !body.is_empty() {
        return Err(Error::UnexpectedBody(method));
    }

    let mut request = HttpRequest::new(method, parts[1]).with_version(version);
    request.headers = headers;
    request.body = body.to_vec();
    Ok(request)
}
