//! Method and path dispatch with a middleware chain.
//!
//! Routes are kept per method in registration order, and the first template
//! that matches a path wins. Register fully literal templates before
//! parameterised ones that would also match them: with `/users/:id`
//! registered first, `/users/blog` is handled by the `:id` route.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::parser::{HttpRequest, Method};
use crate::server::error::Error;
use crate::server::handler::{FnMiddleware, HandlerFn, Middleware, Next, Params, Reply};

/// The non-empty `/`-separated segments of `path`.
pub(crate) fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A route template such as `/users/:user_id/feed` or `/static/*`.
///
/// Segments are compared one by one: literals must be equal, `:name`
/// captures any single segment, and a trailing `*` captures the rest of the
/// path (possibly empty). Empty segments are ignored on both sides, so
/// `/users/` and `/users` are the same path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut parts = path_segments(raw);
        for part in parts.by_ref() {
            if part == "*" {
                segments.push(Segment::Wildcard);
                break;
            }
            match part.strip_prefix(':') {
                Some(name) if !name.is_empty() => segments.push(Segment::Param(name.to_string())),
                _ => segments.push(Segment::Literal(part.to_string())),
            }
        }
        if parts.next().is_some() {
            warn!("Ignoring segments after the wildcard in route template {raw}");
        }
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `path` against the template, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        let mut parts = path_segments(path);
        for segment in &self.segments {
            match segment {
                Segment::Wildcard => {
                    params.insert("*", parts.collect::<Vec<_>>().join("/"));
                    return Some(params);
                }
                Segment::Literal(literal) => {
                    if parts.next()? != literal.as_str() {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.as_str(), parts.next()?);
                }
            }
        }
        parts.next().is_none().then_some(params)
    }
}

/// Represents a route in the HTTP server.
pub struct Route {
    pub template: PathTemplate,
    handler: HandlerFn,
}

/// Routes keyed by method plus an ordered middleware chain.
///
/// Built once at startup and shared read-only between worker threads.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, Vec<Route>>,
    middleware: Vec<Box<dyn Middleware>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<HttpRequest>, Params, Reply) + Send + Sync + 'static,
    {
        self.add_route(Method::GET, path, Box::new(handler))
    }

    pub fn post<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<HttpRequest>, Params, Reply) + Send + Sync + 'static,
    {
        self.add_route(Method::POST, path, Box::new(handler))
    }

    pub fn put<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<HttpRequest>, Params, Reply) + Send + Sync + 'static,
    {
        self.add_route(Method::PUT, path, Box::new(handler))
    }

    pub fn patch<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<HttpRequest>, Params, Reply) + Send + Sync + 'static,
    {
        self.add_route(Method::PATCH, path, Box::new(handler))
    }

    pub fn delete<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<HttpRequest>, Params, Reply) + Send + Sync + 'static,
    {
        self.add_route(Method::DELETE, path, Box::new(handler))
    }

    fn add_route(&mut self, method: Method, path: &str, handler: HandlerFn) -> &mut Self {
        self.routes.entry(method).or_default().push(Route {
            template: PathTemplate::parse(path),
            handler,
        });
        self
    }

    /// Append a middleware to the chain.
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Box::new(middleware));
        self
    }

    /// Append a closure middleware that runs for every request.
    pub fn use_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Arc<HttpRequest>, &Params, Reply, Next) + Send + Sync + 'static,
    {
        self.use_middleware(FnMiddleware { prefix: None, f })
    }

    /// Append a closure middleware that runs for paths under `prefix`.
    pub fn use_fn_at<F>(&mut self, prefix: &str, f: F) -> &mut Self
    where
        F: Fn(Arc<HttpRequest>, &Params, Reply, Next) + Send + Sync + 'static,
    {
        self.use_middleware(FnMiddleware {
            prefix: Some(prefix.to_string()),
            f,
        })
    }

    /// Registered routes as `(method, template)`, in match order per method.
    pub fn routes(&self) -> impl Iterator<Item = (Method, &str)> {
        Method::ROUTABLE.into_iter().flat_map(move |method| {
            self.routes
                .get(&method)
                .into_iter()
                .flatten()
                .map(move |route| (method, route.template.as_str()))
        })
    }

    /// Run the middleware chain and then the matching route for `request`.
    pub fn dispatch(self: &Arc<Self>, request: HttpRequest, reply: Reply) {
        self.run_chain(0, Arc::new(request), reply);
    }

    pub(crate) fn run_chain(self: &Arc<Self>, start: usize, request: Arc<HttpRequest>, reply: Reply) {
        let params = Params::new();
        for (index, middleware) in self.middleware.iter().enumerate().skip(start) {
            if middleware.matches(&request) {
                let next = Next {
                    router: Arc::clone(self),
                    request: Arc::clone(&request),
                    index: index + 1,
                };
                middleware.handle(request, &params, reply, next);
                return;
            }
        }
        self.route(request, reply);
    }

    fn route(&self, request: Arc<HttpRequest>, reply: Reply) {
        let method = request.method();
        let path = request.path().to_string();

        let Some(routes) = self.routes.get(&method) else {
            let allowed = self.allowed_methods(&path);
            let mut response = Error::MethodNotAllowed(method, path).to_response();
            if !allowed.is_empty() {
                response = response.with_trusted_header("Allow", &allowed.join(", "));
            }
            reply.respond(response);
            return;
        };

        for route in routes {
            if let Some(params) = route.template.matches(&path) {
                (route.handler)(request, params, reply);
                return;
            }
        }

        reply.respond(Error::NotFound(path).to_response());
    }

    fn allowed_methods(&self, path: &str) -> Vec<&'static str> {
        Method::ROUTABLE
            .into_iter()
            .filter(|method| {
                self.routes
                    .get(method)
                    .is_some_and(|routes| routes.iter().any(|route| route.template.matches(path).is_some()))
            })
            .map(|method| method.as_str())
            .collect()
    }
}
