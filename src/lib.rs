//! A minimal HTTP/1.1 server.
//!
//! This library provides an HTTP message model, an incremental request framer,
//! a path router with middleware, and a single-threaded readiness-driven event
//! loop that hands complete requests to a bounded worker pool.
//!
//! # Features
//!
//! - Parse and serialize HTTP requests and responses (GET, POST, PUT, PATCH, DELETE, OPTIONS)
//! - Requests framed by `Content-Length`, assembled across any number of reads
//! - Route templates with `:name` parameters and a trailing `*` wildcard
//! - Middleware that can short-circuit or pass control on
//! - JSON request and response bodies
//! - One I/O thread driven by `mio`; handlers run off the I/O thread
//!
//! # Examples
//!
//! ## Parsing
//!
//! ```
//! use microhttp_rs::{parse_request, Method};
//!
//! let request_bytes = b"GET /users/bob/feed?page=2 HTTP/1.1\r\nHost: example.com\r\n\r\n";
//!
//! let request = parse_request(request_bytes).unwrap();
//! assert_eq!(request.method(), Method::GET);
//! assert_eq!(request.path(), "/users/bob/feed");
//! assert_eq!(request.get_query_param("page").unwrap(), "2");
//! ```
//!
//! ## Error handling
//!
//! ```
//! use microhttp_rs::{parse_request, ParserError};
//!
//! let invalid_request = b"INVALID /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
//!
//! match parse_request(invalid_request) {
//!     Ok(_) => println!("Request parsed successfully"),
//!     Err(ParserError::InvalidMethod(method)) => println!("Invalid method: {}", method),
//!     Err(err) => println!("Other error: {}", err),
//! }
//! ```
//!
//! ## Serving
//!
//! ```no_run
//! use microhttp_rs::{HttpResponse, HttpServer, Router, ServerConfig, StatusCode};
//!
//! let mut router = Router::new();
//! router.get("/users/:user_id/feed", |_req, params, reply| {
//!     let user = params.get("user_id").unwrap_or_default().to_string();
//!     reply.respond(HttpResponse::text(StatusCode::Ok, format!("feed of {user}")));
//! });
//!
//! let server = HttpServer::bind(ServerConfig::default(), router)?;
//! server.start()?;
//! # Ok::<(), microhttp_rs::ServerError>(())
//! ```
//!
//! See the `demos` directory for a complete example.

// Export the parser module
pub mod parser;

// Export the server module
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{
    parse_request, parse_response, Error as ParserError, Headers, HttpRequest, HttpResponse, HttpVersion, Method,
    StatusCode,
};
pub use server::{
    Cors, Error as ServerError, HttpServer, Middleware, Next, Params, Reply, RequestContext, Router, ServerConfig,
    ServerHandle,
};
