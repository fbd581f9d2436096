//! HTTP server implementation.
//!
//! One thread owns the listening socket and a `mio` poll and performs all
//! socket I/O. Complete requests are routed on a bounded pool of worker
//! threads; their responses come back through a lock-free queue and a
//! [`Waker`] that interrupts the poll.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use log::{debug, error, info, trace, warn};
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tokio::runtime::{Builder, Runtime};
use tokio::signal;

use crate::parser::{HttpRequest, HttpResponse, StatusCode};
use crate::server::config::ServerConfig;
use crate::server::context::{ContextState, RequestContext};
use crate::server::error::Error;
use crate::server::handler::Reply;
use crate::server::router::Router;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

/// A response produced by a worker for a given connection and request.
struct Completion {
    token: Token,
    generation: u64,
    response: HttpResponse,
}

struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    context: RequestContext,
    /// Bytes read past the end of the current request.
    carry: Vec<u8>,
}

enum Step {
    Keep,
    Close,
}

/// Stops a running [`HttpServer`] from any thread.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ServerHandle {
    /// Ask the event loop to stop. In-flight handlers get the configured
    /// shutdown timeout to finish.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            error!("Failed to wake the event loop for shutdown: {e}");
        }
    }
}

/// An HTTP server.
pub struct HttpServer {
    config: ServerConfig,
    router: Arc<Router>,
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    completions: Arc<SegQueue<Completion>>,
    shutdown: Arc<AtomicBool>,
    runtime: Runtime,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    /// Shared by every read; only the I/O thread touches it.
    scratch: Vec<u8>,
}

impl HttpServer {
    /// Bind the listening socket and start the worker pool.
    ///
    /// Requests are not accepted until [`HttpServer::start`] runs the loop.
    pub fn bind(config: ServerConfig, router: Router) -> Result<Self, Error> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(config.addr)?;
        poll.registry().register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);

        let workers = config.worker_threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .max_blocking_threads(workers)
            .thread_name("microhttp-worker")
            .enable_all()
            .build()?;

        let scratch = vec![0; config.read_buffer_size.max(1)];
        Ok(Self {
            config,
            router: Arc::new(router),
            poll,
            listener,
            waker,
            completions: Arc::new(SegQueue::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            runtime,
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION,
            scratch,
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            waker: Arc::clone(&self.waker),
        }
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Display the bound address and registered endpoints.
    fn display_server_info(&self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("Server listening on http://{addr}"),
            Err(e) => warn!("Server listening on an unknown address: {e}"),
        }
        info!("Registered endpoints:");
        for (method, path) in self.router.routes() {
            info!("  {method} {path}");
        }
    }

    /// Set up a Ctrl+C handler for graceful shutdown.
    fn setup_ctrl_c_handler(&self) {
        let handle = self.handle();
        self.runtime.spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    handle.shutdown();
                }
                Err(e) => error!("Error setting up Ctrl+C handler: {e}"),
            }
        });
    }

    /// Run the event loop on the calling thread until shut down.
    pub fn start(mut self) -> Result<(), Error> {
        self.display_server_info();
        if self.config.handle_ctrl_c {
            self.setup_ctrl_c_handler();
        }

        let mut events = Events::with_capacity(1024);
        let mut serviced = HashSet::new();

        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            serviced.clear();
            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_connections(),
                    WAKER => {}
                    token => {
                        if serviced.insert(token) {
                            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.service(token, event)));
                            if outcome.is_err() {
                                error!("Panic while servicing connection {token:?}, closing it");
                                self.close(token);
                            }
                        }
                    }
                }
            }

            self.drain_completions();
        }

        self.perform_shutdown();
        Ok(())
    }

    /// Perform graceful shutdown.
    fn perform_shutdown(self) {
        info!("Shutting down server, closing {} connections", self.connections.len());
        let HttpServer {
            runtime,
            connections,
            config,
            ..
        } = self;
        drop(connections);
        runtime.shutdown_timeout(config.shutdown_timeout);
        info!("Server shutdown complete");
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.connections.len() >= self.config.max_connections {
                        warn!("Connection limit reached, rejecting connection from {addr}");
                        let response = HttpResponse::text(
                            StatusCode::ServiceUnavailable,
                            "Server is at capacity, please try again later",
                        );
                        let _ = stream.write(&response.to_bytes());
                        continue;
                    }

                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) = self.poll.registry().register(&mut stream, token, Interest::READABLE) {
                        error!("Failed to register connection from {addr}: {e}");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);

                    debug!("Accepted connection from {addr}");
                    let context = RequestContext::new(
                        self.config.initial_context_capacity,
                        self.config.buffer_growth_factor,
                    )
                    .with_max_body_size(self.config.max_body_size);
                    self.connections.insert(
                        token,
                        Connection {
                            stream,
                            addr,
                            context,
                            carry: Vec::new(),
                        },
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Error accepting connection: {e}");
                    break;
                }
            }
        }
    }

    /// Handle one readiness event. Failures close only this connection.
    fn service(&mut self, token: Token, event: &Event) {
        let result = if event.is_error() {
            Err(io::Error::new(io::ErrorKind::Other, "socket error"))
        } else if event.is_writable() {
            self.on_writable(token)
        } else if event.is_readable() || event.is_read_closed() {
            self.on_readable(token)
        } else {
            Ok(Step::Keep)
        };

        match result {
            Ok(Step::Keep) => {}
            Ok(Step::Close) => self.close(token),
            Err(e) => {
                debug!("Connection error on {token:?}: {e}");
                self.close(token);
            }
        }
    }

    fn on_readable(&mut self, token: Token) -> io::Result<Step> {
        let Some(conn) = self.connections.get_mut(&token) else {
            return Ok(Step::Keep);
        };

        // In `Error` the rest of the input is read and discarded so the
        // diagnostic is not lost to a reset when the socket closes.
        while matches!(
            conn.context.state(),
            ContextState::AwaitingHeaders | ContextState::BodyPending | ContextState::Error
        ) {
            match conn.stream.read(&mut self.scratch) {
                Ok(0) if conn.context.state() == ContextState::Error => break,
                Ok(0) => {
                    if conn.context.buffered() > 0 {
                        debug!("{} disconnected mid-request", conn.addr);
                    }
                    return Ok(Step::Close);
                }
                Ok(n) => {
                    trace!("Read {n} bytes from {}", conn.addr);
                    let consumed = conn.context.feed(&self.scratch[..n]);
                    if consumed < n {
                        conn.carry.extend_from_slice(&self.scratch[consumed..n]);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.after_feed(token)
    }

    /// React to the state the context reached after being fed.
    fn after_feed(&mut self, token: Token) -> io::Result<Step> {
        let Some(conn) = self.connections.get_mut(&token) else {
            return Ok(Step::Keep);
        };

        match conn.context.state() {
            ContextState::Ready => {
                // No further reads until the response has been written.
                self.poll.registry().deregister(&mut conn.stream)?;
                let generation = conn.context.generation();
                if let Some(request) = conn.context.take_request() {
                    self.dispatch(token, generation, request);
                }
            }
            ContextState::Error => {
                self.poll.registry().reregister(&mut conn.stream, token, Interest::WRITABLE)?;
            }
            _ => {}
        }
        Ok(Step::Keep)
    }

    /// Route `request` on the worker pool.
    fn dispatch(&self, token: Token, generation: u64, request: HttpRequest) {
        let completions = Arc::clone(&self.completions);
        let waker = Arc::clone(&self.waker);
        let reply = Reply::new(move |response| {
            completions.push(Completion {
                token,
                generation,
                response,
            });
            if let Err(e) = waker.wake() {
                error!("Failed to wake the event loop: {e}");
            }
        });

        let router = Arc::clone(&self.router);
        self.runtime.spawn_blocking(move || {
            let method = request.method();
            let target = request.target().to_string();
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| router.dispatch(request, reply)));
            if outcome.is_err() {
                error!("Handler panicked while serving {method} {target}");
            }
        });
    }

    /// Attach finished responses to their connections and ask for write
    /// readiness. Responses for closed connections or earlier requests are
    /// dropped.
    fn drain_completions(&mut self) {
        while let Some(Completion {
            token,
            generation,
            response,
        }) = self.completions.pop()
        {
            let Some(conn) = self.connections.get_mut(&token) else {
                debug!("Dropping response for closed connection {token:?}");
                continue;
            };
            if conn.context.generation() != generation || !conn.context.attach_response(response) {
                debug!("Dropping stale response for connection {token:?}");
                continue;
            }
            if let Err(e) = self.poll.registry().register(&mut conn.stream, token, Interest::WRITABLE) {
                warn!("Failed to register {} for writing: {e}", conn.addr);
                self.close(token);
            }
        }
    }

    fn on_writable(&mut self, token: Token) -> io::Result<Step> {
        let Some(conn) = self.connections.get_mut(&token) else {
            return Ok(Step::Keep);
        };

        if !conn.context.drain_into(&mut conn.stream)? {
            return Ok(Step::Keep);
        }
        if conn.context.should_close() {
            discard_input(&mut conn.stream, &mut self.scratch);
            let _ = conn.stream.shutdown(Shutdown::Write);
            return Ok(Step::Close);
        }

        conn.context.reset();
        self.poll.registry().reregister(&mut conn.stream, token, Interest::READABLE)?;

        if conn.carry.is_empty() {
            return Ok(Step::Keep);
        }
        let carry = std::mem::take(&mut conn.carry);
        let consumed = conn.context.feed(&carry);
        conn.carry = carry[consumed..].to_vec();
        self.after_feed(token)
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = self.poll.registry().deregister(&mut conn.stream);
            debug!("Closed connection from {}", conn.addr);
        }
    }
}

/// Read and drop whatever the peer has already sent.
///
/// Closing a socket with unread input makes the kernel answer with a reset,
/// which can destroy a response the client has not read yet.
fn discard_input(stream: &mut TcpStream, scratch: &mut [u8]) {
    loop {
        match stream.read(scratch) {
            Ok(0) => break,
            Ok(n) => trace!("Discarded {n} bytes before closing"),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}
