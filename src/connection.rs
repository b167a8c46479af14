//! Module with the non-blocking I/O state machine of a single connection.
//!
//! A [`Connection`] doesn't know anything about HTTP, it only moves bytes
//! between the socket and its buffers. The [`Server`] parses requests from
//! [`Connection::buffer`] and queues responses using
//! [`Connection::queue_response`].
//!
//! All I/O is non-blocking: [`Connection::on_readable`] and
//! [`Connection::on_writable`] do as much I/O as possible until the operation
//! would block, as required by edge-triggered readiness notifications.
//!
//! [`Server`]: crate::Server

use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use log::trace;

use crate::{KeepAlive, Response};

/// Size of the buffer used in a single read call.
const READ_SIZE: usize = 4096;

/// I/O state of a [`Connection`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// No pending output, waiting for a request.
    Reading,
    /// Response(s) are queued for writing.
    Writing,
}

/// Reason to close a connection.
#[derive(Debug)]
pub enum Close {
    /// Peer closed its side of the connection.
    PeerClosed,
    /// More unprocessed input was received than allowed by
    /// [`Limits::max_input_size`].
    ///
    /// [`Limits::max_input_size`]: crate::Limits::max_input_size
    InputTooLarge,
    /// All output was written and the connection was marked to be closed after
    /// writing, see [`Connection::close_after_write`].
    Done,
    /// No activity for longer than the idle timeout.
    IdleTimeout,
    /// Pending output couldn't be written within the write timeout.
    WriteTimeout,
    /// I/O error.
    Io(io::Error),
}

impl Close {
    /// Returns a static message for the reason.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Close::PeerClosed => "peer closed connection",
            Close::InputTooLarge => "input too large",
            Close::Done => "done",
            Close::IdleTimeout => "idle timeout",
            Close::WriteTimeout => "write timeout",
            Close::Io(_) => "I/O error",
        }
    }
}

impl fmt::Display for Close {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Close::Io(err) => write!(f, "I/O error: {err}"),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl From<io::Error> for Close {
    fn from(err: io::Error) -> Close {
        Close::Io(err)
    }
}

/// A single client connection.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    state: State,
    /// Received, but not yet processed, bytes.
    in_buf: Vec<u8>,
    /// Bytes to write and the number already written. `out_pos` is never
    /// larger than the length of `out_buf`.
    out_buf: Vec<u8>,
    out_pos: usize,
    close_after_write: bool,
    last_active: Instant,
    /// Number of completed requests.
    requests: usize,
    max_input_size: usize,
}

impl<S> Connection<S>
where
    S: Read + Write,
{
    /// Create a new connection.
    ///
    /// `max_input_size` is the maximum number of unprocessed bytes buffered.
    pub fn new(stream: S, max_input_size: usize, now: Instant) -> Connection<S> {
        Connection {
            stream,
            state: State::Reading,
            in_buf: Vec::new(),
            out_buf: Vec::new(),
            out_pos: 0,
            close_after_write: false,
            last_active: now,
            requests: 0,
            max_input_size,
        }
    }

    /// Returns the underlying stream.
    pub const fn stream(&self) -> &S {
        &self.stream
    }

    /// Returns mutable access to the underlying stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Returns the current I/O state.
    pub const fn state(&self) -> State {
        self.state
    }

    /// Read from the stream until it would block.
    ///
    /// Returns an error if the peer closed the connection, on I/O errors and
    /// if the unprocessed input grows beyond the maximum input size.
    pub fn on_readable(&mut self, now: Instant) -> Result<(), Close> {
        let mut buf = [0; READ_SIZE];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(Close::PeerClosed),
                Ok(n) => {
                    trace!(bytes = n; "read from connection");
                    self.last_active = now;
                    self.in_buf.extend_from_slice(&buf[..n]);
                    if self.in_buf.len() > self.max_input_size {
                        return Err(Close::InputTooLarge);
                    }
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Close::Io(err)),
            }
        }
    }

    /// Write the pending output until the stream would block or all output is
    /// written.
    ///
    /// Once all output is written the state returns to [`State::Reading`], or
    /// if the connection is marked to close after writing this returns
    /// [`Close::Done`].
    pub fn on_writable(&mut self, now: Instant) -> Result<(), Close> {
        while self.out_pos < self.out_buf.len() {
            match self.stream.write(&self.out_buf[self.out_pos..]) {
                Ok(0) => return Err(Close::Io(io::ErrorKind::WriteZero.into())),
                Ok(n) => {
                    trace!(bytes = n; "wrote to connection");
                    self.out_pos += n;
                    self.last_active = now;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Close::Io(err)),
            }
        }

        self.out_buf.clear();
        self.out_pos = 0;
        self.state = State::Reading;
        if self.close_after_write {
            Err(Close::Done)
        } else {
            Ok(())
        }
    }

    /// Returns the received bytes that are not yet processed.
    pub fn buffer(&self) -> &[u8] {
        &self.in_buf
    }

    /// Mark the first `n` bytes of the buffer as processed.
    ///
    /// # Panics
    ///
    /// Panics if `n` is larger than the buffer.
    pub fn consume(&mut self, n: usize) {
        drop(self.in_buf.drain(..n));
    }

    /// Queue `response` for writing.
    pub fn queue_response(&mut self, response: &Response, keep_alive: KeepAlive) {
        response.encode(keep_alive, &mut self.out_buf);
        self.state = State::Writing;
    }

    /// Returns `true` if there is output waiting to be written.
    pub fn has_pending_output(&self) -> bool {
        self.out_pos < self.out_buf.len()
    }

    /// Close the connection once all pending output is written.
    ///
    /// If there is no pending output this returns [`Close::Done`], the
    /// connection should be closed immediately as there won't be another
    /// writable event.
    pub fn close_after_write(&mut self) -> Result<(), Close> {
        self.close_after_write = true;
        if self.has_pending_output() {
            Ok(())
        } else {
            Err(Close::Done)
        }
    }

    /// Returns `true` if the connection is marked to close after writing.
    pub const fn is_closing(&self) -> bool {
        self.close_after_write
    }

    /// Increase the number of completed requests, returning the new count.
    pub fn request_done(&mut self) -> usize {
        self.requests += 1;
        self.requests
    }

    /// Returns the number of completed requests.
    pub const fn requests(&self) -> usize {
        self.requests
    }

    /// Check the connection for timeouts.
    ///
    /// Connections with pending output use `write_timeout`, all others use
    /// `idle_timeout`.
    pub fn check_timeout(
        &self,
        now: Instant,
        idle_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<(), Close> {
        let elapsed = now.saturating_duration_since(self.last_active);
        if self.has_pending_output() {
            if elapsed > write_timeout {
                return Err(Close::WriteTimeout);
            }
        } else if elapsed > idle_timeout {
            return Err(Close::IdleTimeout);
        }
        Ok(())
    }
}
