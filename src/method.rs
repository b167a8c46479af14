//! Method related types.

use std::fmt;
use std::str::FromStr;

/// HTTP method.
///
/// All methods registered in RFC 9110 section 9.3 are recognised, but only
/// [`Method::Get`], [`Method::Post`] and [`Method::Delete`] are served, see
/// [`Method::is_supported`]. Requests using any other method are answered with
/// `501 Not Implemented`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Method {
    /// GET method.
    Get,
    /// HEAD method.
    Head,
    /// POST method.
    Post,
    /// PUT method.
    Put,
    /// DELETE method.
    Delete,
    /// CONNECT method.
    Connect,
    /// OPTIONS method.
    Options,
    /// TRACE method.
    Trace,
    /// PATCH method (RFC 5789).
    Patch,
}

impl Method {
    /// Returns `true` if the server implements the method.
    ///
    /// GET is always accepted, POST is used for uploads and DELETE for
    /// removing resources.
    pub const fn is_supported(self) -> bool {
        matches!(self, Method::Get | Method::Post | Method::Delete)
    }

    /// Returns `true` if the request MUST declare its body length, using either
    /// a Content-Length or Transfer-Encoding header.
    ///
    /// Requests for which this returns `true` without either header are
    /// answered with `411 Length Required`.
    pub const fn requires_body(self) -> bool {
        matches!(self, Method::Post)
    }

    /// Returns the method as string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Connect => "CONNECT",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the [`FromStr`] implementation for [`Method`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnknownMethod;

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown HTTP method")
    }
}

impl std::error::Error for UnknownMethod {}

impl FromStr for Method {
    type Err = UnknownMethod;

    /// Method tokens are case-sensitive (RFC 9110 section 9.1), so `get` is
    /// not [`Method::Get`].
    fn from_str(method: &str) -> Result<Self, Self::Err> {
        match method {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "CONNECT" => Ok(Method::Connect),
            "OPTIONS" => Ok(Method::Options),
            "TRACE" => Ok(Method::Trace),
            "PATCH" => Ok(Method::Patch),
            _ => Err(UnknownMethod),
        }
    }
}
