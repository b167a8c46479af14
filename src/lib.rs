//! Single threaded, non-blocking HTTP/1.1 server engine.
//!
//! The engine is made up of the following parts, leaves first:
//!
//!  * [`ParseResult`]: outcome of trying to get a request out of a buffer.
//!  * [`RequestParser`]: incremental parser that turns the bytes buffered for a
//!    connection into a [`ParsedRequest`].
//!  * [`RequestValidator`]: applies the RFC 7230/7231 semantic checks to a
//!    parsed request, mapping violations to the proper [`StatusCode`].
//!  * [`Connection`]: non-blocking I/O state machine for a single socket.
//!  * [`Server`]: the event loop that owns the listeners and all connections,
//!    drives the parse-validate-dispatch-respond cycle and sweeps timeouts.
//!
//! Requests that pass validation are passed to a [`Handler`], which returns a
//! [`Response`] that is serialised and written back to the client.
//!
//! # Examples
//!
//! ```no_run
//! use webserv::{Config, Request, Response, Server, ServerConfig, StatusCode};
//!
//! # fn main() -> std::io::Result<()> {
//! let address = "127.0.0.1:8080".parse().unwrap();
//! let config = Config::default().with_server(ServerConfig::new(address));
//!
//! let handler = |request: &Request, _: &ServerConfig| {
//!     let body = format!("Hello {}", request.path());
//!     Response::build_new(StatusCode::OK).with_body(body.into_bytes())
//! };
//!
//! let mut server = Server::new(config, handler)?;
//! server.run()
//! # }
//! ```

pub mod config;
pub mod connection;
mod error_page;
pub mod handler;
pub mod header;
pub mod method;
mod parse;
pub mod parser;
mod request;
mod response;
pub mod server;
pub mod session;
mod status_code;
mod validate;
pub mod version;

#[doc(no_inline)]
pub use config::{Config, Limits, ServerConfig};
#[doc(no_inline)]
pub use connection::Connection;
pub use error_page::ErrorPages;
#[doc(no_inline)]
pub use handler::Handler;
#[doc(no_inline)]
pub use header::{Header, HeaderName, Headers};
#[doc(no_inline)]
pub use method::Method;
pub use parse::ParseResult;
#[doc(no_inline)]
pub use parser::{ParseError, ParsedRequest, RequestParser};
pub use request::Request;
pub use response::{KeepAlive, Response};
#[doc(no_inline)]
pub use server::{Server, ShutdownHandle};
pub use status_code::StatusCode;
pub use validate::RequestValidator;
#[doc(no_inline)]
pub use version::Version;

/// Log target used for the request log.
///
/// `std-logger` writes messages using this target to standard out.
pub const REQUEST_TARGET: &str = "request";

/// Returns `true` if `lower_case` and `right` are a case-insensitive match.
///
/// # Notes
///
/// `lower_case` must be lower case!
const fn cmp_lower_case(lower_case: &str, right: &str) -> bool {
    debug_assert!(is_lower_case(lower_case));

    let left = lower_case.as_bytes();
    let right = right.as_bytes();
    let len = left.len();
    if len != right.len() {
        return false;
    }

    let mut i = 0;
    while i < len {
        if left[i] != right[i].to_ascii_lowercase() {
            return false;
        }
        i += 1;
    }
    true
}

/// Returns `true` if `value` is all ASCII lowercase.
const fn is_lower_case(value: &str) -> bool {
    let value = value.as_bytes();
    let mut i = 0;
    while i < value.len() {
        // NOTE: allows `-` because it's used in header names.
        if !matches!(value[i], b'0'..=b'9' | b'a'..=b'z' | b'-') {
            return false;
        }
        i += 1;
    }
    true
}

/// Trim whitespace (spaces and tabs) from the start and end of `value`.
const fn trim_ws(value: &[u8]) -> &[u8] {
    let mut value = value;
    while let [b' ' | b'\t', rest @ ..] = value {
        value = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = value {
        value = rest;
    }
    value
}

/// Returns the position of the first `\r\n` in `buf`, if any.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
