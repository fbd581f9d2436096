//! Handler and middleware contracts.
//!
//! A handler receives the request, the captured path parameters and a
//! [`Reply`]. It answers by consuming the reply, either right away or later
//! from another thread or task. Consuming the reply is the only way to
//! produce a response, so a handler cannot answer twice.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::{error, warn};

use crate::parser::{HttpRequest, HttpResponse, StatusCode};
use crate::server::router::{path_segments, Router};

/// Type alias for a route handler.
pub type HandlerFn = Box<dyn Fn(Arc<HttpRequest>, Params, Reply) + Send + Sync>;

/// Path parameters captured by a route template, keyed by name.
///
/// A trailing wildcard segment is captured under `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}

type Sink = Box<dyn FnOnce(HttpResponse) + Send>;

/// One-shot continuation that delivers the response for a request.
///
/// Dropping a `Reply` without using it (for example because the handler
/// panicked) answers with `500 Internal Server Error` so the connection is
/// never left waiting.
pub struct Reply {
    sink: Option<Sink>,
}

impl Reply {
    pub fn new(sink: impl FnOnce(HttpResponse) + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
        }
    }

    /// Deliver a built response.
    pub fn respond(mut self, response: HttpResponse) {
        if let Some(sink) = self.sink.take() {
            sink(response);
        }
    }

    /// Report a failure. The description is logged and the client gets a
    /// generic 500.
    pub fn fail(self, err: impl fmt::Display) {
        error!("Handler failed: {err}");
        self.respond(internal_error());
    }

    /// Deliver a response or an error description.
    pub fn send<E: fmt::Display>(self, result: Result<HttpResponse, E>) {
        match result {
            Ok(response) => self.respond(response),
            Err(err) => self.fail(err),
        }
    }

    /// Wrap the reply so `f` sees, and may rewrite, whatever response is
    /// delivered through it.
    pub fn map(mut self, f: impl FnOnce(HttpResponse) -> HttpResponse + Send + 'static) -> Reply {
        let sink = self.sink.take().map(|sink| -> Sink { Box::new(move |response| sink(f(response))) });
        Reply { sink }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            warn!("Reply dropped without a response, answering 500");
            sink(internal_error());
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").field("pending", &self.sink.is_some()).finish()
    }
}

fn internal_error() -> HttpResponse {
    let status = StatusCode::InternalServerError;
    HttpResponse::text(status, status.reason_phrase())
}

/// Continuation into the rest of the middleware chain and, after it, the
/// matched route handler.
pub struct Next {
    pub(crate) router: Arc<Router>,
    pub(crate) request: Arc<HttpRequest>,
    pub(crate) index: usize,
}

impl Next {
    /// Pass the request on. `reply` is usually the reply the middleware was
    /// given, possibly wrapped with [`Reply::map`].
    pub fn run(self, reply: Reply) {
        self.router.run_chain(self.index, self.request, reply);
    }
}

/// A request-processing step run before route matching.
///
/// A middleware either answers through `reply` or hands `reply` to `next`.
/// Both consume it, so it cannot do both.
pub trait Middleware: Send + Sync + 'static {
    /// Whether this middleware applies to `request`. Skipped ones are
    /// passed over.
    fn matches(&self, _request: &HttpRequest) -> bool {
        true
    }

    fn handle(&self, request: Arc<HttpRequest>, params: &Params, reply: Reply, next: Next);
}

/// A closure middleware, optionally limited to a path prefix.
pub(crate) struct FnMiddleware<F> {
    pub(crate) prefix: Option<String>,
    pub(crate) f: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(Arc<HttpRequest>, &Params, Reply, Next) + Send + Sync + 'static,
{
    /// A prefix matches whole path segments: `/admin` covers `/admin` and
    /// `/admin/users` but not `/administrators`.
    fn matches(&self, request: &HttpRequest) -> bool {
        self.prefix.as_deref().map_or(true, |prefix| {
            let mut path = path_segments(request.path());
            path_segments(prefix).all(|segment| path.next() == Some(segment))
        })
    }

    fn handle(&self, request: Arc<HttpRequest>, params: &Params, reply: Reply, next: Next) {
        (self.f)(request, params, reply, next)
    }
}
