use std::fmt;
use std::time::{Duration, SystemTime};

use crate::header::{Header, HeaderName};
use crate::request::has_close_option;
use crate::{Headers, StatusCode, Version};

/// HTTP response.
///
/// Returned by a [`Handler`], serialised by the server which adds the
/// `Content-Length`, `Date` and connection management headers.
///
/// [`Handler`]: crate::Handler
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Create a new HTTP response.
    pub const fn new(status: StatusCode, headers: Headers, body: Vec<u8>) -> Response {
        Response {
            status,
            headers,
            body,
        }
    }

    /// Create a new response with `status`, without headers or body.
    pub const fn build_new(status: StatusCode) -> Response {
        Response::new(status, Headers::EMPTY, Vec::new())
    }

    /// Set the body of the response.
    pub fn with_body(mut self, body: Vec<u8>) -> Response {
        self.body = body;
        self
    }

    /// Add a header to the response.
    pub fn with_header(mut self, name: HeaderName, value: &[u8]) -> Response {
        self.headers.append(Header::new(name, value));
        self
    }

    /// Returns the response code.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the headers.
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns mutable access to the headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Returns `true` if the response contains a `Connection: close` header.
    pub fn wants_close(&self) -> bool {
        self.headers
            .get_all(&HeaderName::CONNECTION)
            .any(has_close_option)
    }

    /// Serialise the response into `buf`.
    ///
    /// Any Connection, Keep-Alive, Content-Length or Transfer-Encoding headers
    /// set by the handler are replaced.
    pub(crate) fn encode(&self, keep_alive: KeepAlive, buf: &mut Vec<u8>) {
        let mut itoa_buf = itoa::Buffer::new();

        // Format the status-line (RFC 9112 section 4).
        buf.extend_from_slice(Version::Http11.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(itoa_buf.format(self.status.0).as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(self.status.reason().as_bytes());
        buf.extend_from_slice(b"\r\n");

        // Format the headers (RFC 9112 section 5).
        let mut set_date_header = false;
        for header in &self.headers {
            let name = header.name();
            if *name == HeaderName::CONNECTION
                || *name == HeaderName::KEEP_ALIVE
                || *name == HeaderName::CONTENT_LENGTH
                || *name == HeaderName::TRANSFER_ENCODING
            {
                continue;
            } else if *name == HeaderName::DATE {
                set_date_header = true;
            }
            buf.extend_from_slice(name.as_ref().as_bytes());
            buf.extend_from_slice(b": ");
            buf.extend_from_slice(header.value());
            buf.extend_from_slice(b"\r\n");
        }

        if !set_date_header {
            buf.extend_from_slice(b"Date: ");
            buf.extend_from_slice(httpdate::fmt_http_date(SystemTime::now()).as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        match keep_alive {
            KeepAlive::Close => buf.extend_from_slice(b"Connection: close\r\n"),
            KeepAlive::Open { timeout, max } => {
                buf.extend_from_slice(b"Connection: keep-alive\r\nKeep-Alive: timeout=");
                buf.extend_from_slice(itoa_buf.format(timeout_secs(timeout)).as_bytes());
                buf.extend_from_slice(b", max=");
                buf.extend_from_slice(itoa_buf.format(max).as_bytes());
                buf.extend_from_slice(b"\r\n");
            }
        }

        // 1xx, 204 and 304 responses don't have a body.
        let include_body = self.status.includes_body();
        if include_body {
            buf.extend_from_slice(b"Content-Length: ");
            buf.extend_from_slice(itoa_buf.format(self.body.len()).as_bytes());
            buf.extend_from_slice(b"\r\n");
        }

        // End of the HTTP head.
        buf.extend_from_slice(b"\r\n");

        if include_body {
            buf.extend_from_slice(&self.body);
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_length", &self.body.len())
            .finish()
    }
}

/// Returns `timeout` in whole seconds, rounded up and at least one.
///
/// `timeout=0` would tell the client not to reuse the connection.
fn timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() != 0);
    secs.max(1)
}

/// Connection management of a response, see [`Response::encode`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeepAlive {
    /// Close the connection after the response, sends `Connection: close`.
    Close,
    /// Keep the connection open, sends `Connection: keep-alive` and a
    /// `Keep-Alive` header with the idle timeout and the number of requests
    /// left on the connection.
    Open {
        /// Idle timeout.
        timeout: Duration,
        /// Remaining requests.
        max: usize,
    },
}
