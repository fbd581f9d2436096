//! Per-connection request framing.
//!
//! A [`RequestContext`] accumulates the bytes of one request, decides when the
//! request is complete, and then holds the serialized response while the event
//! loop drains it onto the socket. It performs no I/O of its own beyond
//! writing into the sink it is handed.

use std::io::{self, Write};

use log::{trace, warn};
use memchr::memmem;

use crate::parser::{parse_request, Error as ParserError, HttpRequest, HttpResponse, HEAD_TERMINATOR};
use crate::server::error::Error;

/// Upper bound on any body length; keeps the outstanding count representable.
const MAX_BODY_SIZE: usize = isize::MAX as usize;

/// Where a connection is in the life of its current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Looking for the blank line that ends the head.
    AwaitingHeaders,
    /// Head parsed, body bytes still outstanding.
    BodyPending,
    /// The request is complete and has not been handed out yet.
    Ready,
    /// The request is with the router; no response yet.
    Dispatched,
    /// A response is attached and partially written.
    Responding,
    /// The response has been fully written.
    Done,
    /// Framing failed; a diagnostic response is queued and the connection
    /// closes once it is written.
    Error,
}

/// Framing state for one connection.
#[derive(Debug)]
pub struct RequestContext {
    buffer: Vec<u8>,
    cursor: usize,
    /// Body bytes still expected; -1 until the head has been parsed.
    remaining: isize,
    headers_found: bool,
    failed: bool,
    state: ContextState,
    head: Option<HttpRequest>,
    body_start: usize,
    response: Option<Vec<u8>>,
    written: usize,
    close_after: bool,
    generation: u64,
    initial_capacity: usize,
    growth_factor: usize,
    max_body_size: usize,
}

impl RequestContext {
    /// Create an empty context.
    ///
    /// # Arguments
    ///
    /// * `initial_capacity` - Starting size of the request buffer
    /// * `growth_factor` - Multiplier applied to the buffer size on overflow (at least 2)
    pub fn new(initial_capacity: usize, growth_factor: usize) -> Self {
        let initial_capacity = initial_capacity.max(1);
        Self {
            buffer: vec![0; initial_capacity],
            cursor: 0,
            remaining: -1,
            headers_found: false,
            failed: false,
            state: ContextState::AwaitingHeaders,
            head: None,
            body_start: 0,
            response: None,
            written: 0,
            close_after: false,
            generation: 0,
            initial_capacity,
            growth_factor: growth_factor.max(2),
            max_body_size: MAX_BODY_SIZE,
        }
    }

    /// Reject requests advertising a body longer than `max_body_size`.
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size.min(MAX_BODY_SIZE);
        self
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Body bytes still expected, or -1 before the head is parsed.
    pub fn remaining(&self) -> isize {
        self.remaining
    }

    pub fn headers_found(&self) -> bool {
        self.headers_found
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Bytes of the current request held in the buffer.
    pub fn buffered(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Incremented on every reset; tags each dispatch so late responses for
    /// an earlier request can be told apart.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the connection must close once the response is written.
    pub fn should_close(&self) -> bool {
        self.failed || self.close_after
    }

    /// Feed inbound bytes into the state machine.
    ///
    /// # Returns
    ///
    /// How many bytes of `chunk` belong to the current request. Bytes past
    /// that point were sent early for the next request and are left to the
    /// caller. In any state other than `AwaitingHeaders` and `BodyPending`
    /// nothing is consumed, except in `Error` where input is discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        match self.state {
            ContextState::AwaitingHeaders => self.feed_head(chunk),
            ContextState::BodyPending => self.feed_body(chunk),
            ContextState::Error => chunk.len(),
            _ => 0,
        }
    }

    fn feed_head(&mut self, chunk: &[u8]) -> usize {
        // The terminator may straddle the previous chunk.
        let search_from = self.cursor.saturating_sub(HEAD_TERMINATOR.len() - 1);
        self.append(chunk);

        let Some(offset) = memmem::find(&self.buffer[search_from..self.cursor], HEAD_TERMINATOR) else {
            return chunk.len();
        };
        self.headers_found = true;
        self.body_start = search_from + offset + HEAD_TERMINATOR.len();

        let request = match parse_request(&self.buffer[..self.body_start]) {
            Ok(request) => request,
            Err(e) => {
                self.fail(Error::ParseError(e));
                return chunk.len();
            }
        };

        let expected = match request.content_length() {
            Ok(Some(len)) if len > self.max_body_size => {
                self.fail(Error::ParseError(ParserError::InvalidContentLength(len.to_string())));
                return chunk.len();
            }
            Ok(Some(len)) if len > 0 && !request.method().allows_body() => {
                self.fail(Error::ParseError(ParserError::UnexpectedBody(request.method())));
                return chunk.len();
            }
            Ok(Some(len)) => len,
            Ok(None) if request.method().allows_body() => {
                self.fail(Error::MissingLength(request.method()));
                return chunk.len();
            }
            Ok(None) => 0,
            Err(e) => {
                self.fail(Error::ParseError(e));
                return chunk.len();
            }
        };

        let received = self.cursor - self.body_start;
        let excess = received.saturating_sub(expected);
        self.cursor -= excess;
        self.remaining = match isize::try_from(expected - (received - excess)) {
            Ok(outstanding) => outstanding,
            Err(_) => {
                self.fail(Error::ParseError(ParserError::InvalidContentLength(expected.to_string())));
                return chunk.len();
            }
        };

        trace!(
            "Parsed head of {} {}: {} body bytes expected, {} outstanding",
            request.method(),
            request.target(),
            expected,
            self.remaining
        );

        self.close_after = request.wants_close();
        self.head = Some(request);
        self.state = if self.remaining > 0 {
            ContextState::BodyPending
        } else {
            ContextState::Ready
        };
        chunk.len() - excess
    }

    fn feed_body(&mut self, chunk: &[u8]) -> usize {
        let take = chunk.len().min(self.remaining.unsigned_abs());
        self.append(&chunk[..take]);
        self.remaining -= take as isize;
        if self.remaining == 0 {
            self.state = ContextState::Ready;
        }
        take
    }

    fn append(&mut self, chunk: &[u8]) {
        let needed = self.cursor + chunk.len();
        if needed > self.buffer.len() {
            let mut capacity = self.buffer.len();
            while capacity < needed {
                capacity *= self.growth_factor;
            }
            self.buffer.resize(capacity, 0);
        }
        self.buffer[self.cursor..needed].copy_from_slice(chunk);
        self.cursor = needed;
    }

    /// Hand out the assembled request, moving to `Dispatched`.
    ///
    /// Returns `None` unless the context is `Ready`.
    pub fn take_request(&mut self) -> Option<HttpRequest> {
        if self.state != ContextState::Ready {
            return None;
        }
        let mut request = self.head.take()?;
        request.attach_body(self.buffer[self.body_start..self.cursor].to_vec());
        self.state = ContextState::Dispatched;
        Some(request)
    }

    /// Attach the router's response to a dispatched request.
    ///
    /// A response without `Content-Length` gets one, so the client can find
    /// where it ends on a kept-alive connection.
    ///
    /// Returns `false`, leaving the context untouched, if no request is
    /// awaiting a response.
    pub fn attach_response(&mut self, response: HttpResponse) -> bool {
        if self.state != ContextState::Dispatched {
            return false;
        }
        let mut response = response;
        if response.get_header("Content-Length").is_none() {
            let length = response.body().len().to_string();
            response = response.with_trusted_header("Content-Length", &length);
        }
        if self.close_after {
            response = response.with_trusted_header("Connection", "close");
        }
        self.response = Some(response.to_bytes());
        self.written = 0;
        self.state = ContextState::Responding;
        true
    }

    /// Abandon the request and queue the diagnostic response for `error`.
    pub fn fail(&mut self, error: Error) {
        warn!("Rejecting request: {error}");
        let response = error.to_response().with_trusted_header("Connection", "close");
        self.failed = true;
        self.head = None;
        self.response = Some(response.to_bytes());
        self.written = 0;
        self.state = ContextState::Error;
    }

    /// The part of the response not yet written.
    pub fn pending_output(&self) -> &[u8] {
        self.response.as_deref().map_or(&[], |bytes| &bytes[self.written..])
    }

    /// Write as much of the response as `out` accepts.
    ///
    /// # Returns
    ///
    /// `true` once the whole response has been written (state `Done`),
    /// `false` if the sink would block first or there is nothing to write.
    pub fn drain_into<W: Write>(&mut self, out: &mut W) -> io::Result<bool> {
        let Some(bytes) = self.response.as_ref() else {
            return Ok(false);
        };
        if self.state == ContextState::Error {
            self.state = ContextState::Responding;
        }

        while self.written < bytes.len() {
            match out.write(&bytes[self.written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.state = ContextState::Done;
        Ok(true)
    }

    /// Return to `AwaitingHeaders` for the next request on the connection.
    pub fn reset(&mut self) {
        if self.buffer.len() > self.initial_capacity {
            self.buffer = vec![0; self.initial_capacity];
        }
        self.cursor = 0;
        self.remaining = -1;
        self.headers_found = false;
        self.failed = false;
        self.state = ContextState::AwaitingHeaders;
        self.head = None;
        self.body_start = 0;
        self.response = None;
        self.written = 0;
        self.close_after = false;
        self.generation += 1;
    }
}
