use std::{fmt, str};

use crate::header::HeaderName;
use crate::{Headers, Method, Version};

/// A complete, validated HTTP request.
///
/// Handlers only ever see requests that passed the [`RequestValidator`], so
/// the method is supported, the version is HTTP/1.1 and a Host header is
/// present.
///
/// [`RequestValidator`]: crate::RequestValidator
pub struct Request {
    method: Method,
    target: String,
    version: Version,
    headers: Headers,
    body: Vec<u8>,
}

impl Request {
    /// Create a new request.
    pub const fn new(
        method: Method,
        target: String,
        version: Version,
        headers: Headers,
        body: Vec<u8>,
    ) -> Request {
        Request {
            method,
            target,
            version,
            headers,
            body,
        }
    }

    /// Returns the HTTP method of this request.
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Returns the request target, i.e. the path and query.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the path of the request target, without the query.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// Returns the query of the request target, without the `?`.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Returns the HTTP version of this request.
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Returns the request headers.
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the Host header, if valid UTF-8.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get_bytes(&HeaderName::HOST)
            .and_then(|host| str::from_utf8(host).ok())
    }

    /// Returns `false` if the client asked to close the connection using
    /// `Connection: close`.
    pub fn keep_alive(&self) -> bool {
        !self
            .headers
            .get_all(&HeaderName::CONNECTION)
            .any(has_close_option)
    }

    /// Returns the request body.
    ///
    /// For chunked requests this is the decoded body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Returns `true` if the Connection header `value` contains the `close` option.
pub(crate) fn has_close_option(value: &[u8]) -> bool {
    value
        .split(|b| *b == b',')
        .any(|option| crate::trim_ws(option).eq_ignore_ascii_case(b"close"))
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("body_length", &self.body.len())
            .finish()
    }
}
