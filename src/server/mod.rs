//! HTTP server implementation for microhttp-rs.
//!
//! This module provides the event loop, the per-connection framing state
//! machine and the router that hands requests to application handlers.

mod config;
mod context;
mod cors;
mod error;
mod handler;
mod http_server;
mod router;

// Re-export public items
pub use config::ServerConfig;
pub use context::{ContextState, RequestContext};
pub use cors::Cors;
pub use error::Error;
pub use handler::{HandlerFn, Middleware, Next, Params, Reply};
pub use http_server::{HttpServer, ServerHandle};
pub use router::{PathTemplate, Router};
