//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address to bind to.
    pub addr: SocketAddr,
    /// The maximum number of concurrent connections.
    pub max_connections: usize,
    /// Size of the scratch buffer the I/O thread reads into.
    pub read_buffer_size: usize,
    /// Initial capacity of each connection's request buffer.
    pub initial_context_capacity: usize,
    /// Factor the request buffer capacity is multiplied by when it overflows.
    pub buffer_growth_factor: usize,
    /// Largest `Content-Length` accepted; larger requests get a 400.
    pub max_body_size: usize,
    /// Number of worker threads that run the router.
    pub worker_threads: usize,
    /// Shut down gracefully on Ctrl+C.
    pub handle_ctrl_c: bool,
    /// How long shutdown waits for in-flight handlers.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.read_buffer_size = read_buffer_size.max(1);
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }

    pub fn with_ctrl_c(mut self, handle_ctrl_c: bool) -> Self {
        self.handle_ctrl_c = handle_ctrl_c;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            max_connections: 1024,
            read_buffer_size: 8192,
            initial_context_capacity: 1024,
            buffer_growth_factor: 2,
            max_body_size: 16 * 1024 * 1024,
            worker_threads: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            handle_ctrl_c: true,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}
