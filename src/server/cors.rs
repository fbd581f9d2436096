//! CORS middleware.

use std::sync::Arc;

use crate::parser::{Error as ParserError, Headers, HttpRequest, HttpResponse, Method, StatusCode};
use crate::server::handler::{Middleware, Next, Params, Reply};

/// Answers preflight requests and stamps CORS headers on every response.
///
/// Every `OPTIONS` request is answered with `204 No Content` and the CORS
/// headers, whether or not a route exists for its path. Other requests pass
/// through and get `Access-Control-Allow-Origin` added to their response.
#[derive(Debug, Clone)]
pub struct Cors {
    origin: String,
    preflight: Headers,
}

impl Cors {
    /// Allow requests from `origin` (`*` for any).
    pub fn new(origin: &str) -> Result<Self, ParserError> {
        let mut preflight = Headers::new();
        preflight.insert("Access-Control-Allow-Origin", origin)?;
        preflight.insert("Access-Control-Allow-Methods", "GET, POST, PUT, PATCH, DELETE, OPTIONS")?;
        preflight.insert("Access-Control-Allow-Headers", "Content-Type, Authorization")?;
        preflight.insert("Access-Control-Max-Age", "86400")?;
        Ok(Self {
            origin: origin.to_string(),
            preflight,
        })
    }

    /// Allow any origin.
    pub fn permissive() -> Self {
        let mut preflight = Headers::new();
        for (name, value) in [
            ("Access-Control-Allow-Origin", "*"),
            ("Access-Control-Allow-Methods", "GET, POST, PUT, PATCH, DELETE, OPTIONS"),
            ("Access-Control-Allow-Headers", "Content-Type, Authorization"),
            ("Access-Control-Max-Age", "86400"),
        ] {
            preflight.put(name.to_string(), value.to_string());
        }
        Self {
            origin: "*".to_string(),
            preflight,
        }
    }

    /// Replace the allowed request headers.
    pub fn with_allowed_headers(mut self, headers: &str) -> Result<Self, ParserError> {
        self.preflight.insert("Access-Control-Allow-Headers", headers)?;
        Ok(self)
    }

    fn preflight_response(&self) -> HttpResponse {
        self.preflight
            .iter()
            .fold(HttpResponse::new(StatusCode::NoContent), |response, (name, value)| {
                response.with_trusted_header(name, value)
            })
            .with_body(Vec::new())
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::permissive()
    }
}

impl Middleware for Cors {
    fn handle(&self, request: Arc<HttpRequest>, _params: &Params, reply: Reply, next: Next) {
        if request.method() == Method::OPTIONS {
            reply.respond(self.preflight_response());
            return;
        }
        let origin = self.origin.clone();
        next.run(reply.map(move |response| response.with_trusted_header("Access-Control-Allow-Origin", &origin)));
    }
}
