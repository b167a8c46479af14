use std::fmt;

/// Response Status Code.
///
/// Only the codes the server itself produces, or a handler is likely to
/// return, have named constants. Any other value can be created using the
/// tuple constructor, e.g. `StatusCode(418)`.
///
/// RFC 9110 section 15.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StatusCode(pub u16);

impl StatusCode {
    // 1xx range.
    /// 100 Continue.
    pub const CONTINUE: StatusCode = StatusCode(100);

    // 2xx range.
    /// 200 OK.
    pub const OK: StatusCode = StatusCode(200);
    /// 201 Created.
    pub const CREATED: StatusCode = StatusCode(201);
    /// 204 No Content.
    pub const NO_CONTENT: StatusCode = StatusCode(204);

    // 3xx range.
    /// 301 Moved Permanently.
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    /// 302 Found.
    pub const FOUND: StatusCode = StatusCode(302);
    /// 304 Not Modified.
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    /// 307 Temporary Redirect.
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    /// 308 Permanent Redirect.
    pub const PERMANENT_REDIRECT: StatusCode = StatusCode(308);

    // 4xx range.
    /// 400 Bad Request.
    ///
    /// Used for all syntax errors and for a missing or duplicate Host header.
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    /// 401 Unauthorized.
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    /// 403 Forbidden.
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    /// 404 Not Found.
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// 405 Method Not Allowed.
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    /// 408 Request Timeout.
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    /// 409 Conflict.
    pub const CONFLICT: StatusCode = StatusCode(409);
    /// 410 Gone.
    pub const GONE: StatusCode = StatusCode(410);
    /// 411 Length Required.
    ///
    /// RFC 9110 section 15.5.12.
    pub const LENGTH_REQUIRED: StatusCode = StatusCode(411);
    /// 413 Payload Too Large.
    ///
    /// RFC 9110 section 15.5.14.
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    /// 414 URI Too Long.
    ///
    /// RFC 9110 section 15.5.15.
    pub const URI_TOO_LONG: StatusCode = StatusCode(414);
    /// 415 Unsupported Media Type.
    pub const UNSUPPORTED_MEDIA_TYPE: StatusCode = StatusCode(415);
    /// 429 Too Many Requests.
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);
    /// 431 Request Header Fields Too Large.
    ///
    /// RFC 6585 section 5.
    pub const REQUEST_HEADER_FIELDS_TOO_LARGE: StatusCode = StatusCode(431);

    // 5xx range.
    /// 500 Internal Server Error.
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    /// 501 Not Implemented.
    ///
    /// RFC 9110 section 15.6.2.
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    /// 502 Bad Gateway.
    pub const BAD_GATEWAY: StatusCode = StatusCode(502);
    /// 503 Service Unavailable.
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);
    /// 504 Gateway Timeout.
    pub const GATEWAY_TIMEOUT: StatusCode = StatusCode(504);
    /// 505 HTTP Version Not Supported.
    ///
    /// RFC 9110 section 15.6.6.
    pub const HTTP_VERSION_NOT_SUPPORTED: StatusCode = StatusCode(505);

    /// Returns `true` if the status code is in 1xx range.
    pub const fn is_informational(self) -> bool {
        self.0 >= 100 && self.0 <= 199
    }

    /// Returns `true` if the status code is in 2xx range.
    pub const fn is_successful(self) -> bool {
        self.0 >= 200 && self.0 <= 299
    }

    /// Returns `true` if the status code is in 4xx or 5xx range.
    pub const fn is_error(self) -> bool {
        self.0 >= 400 && self.0 <= 599
    }

    /// Returns `false` if the status code MUST NOT include a body.
    ///
    /// This includes the entire 1xx (Informational) range, 204 (No Content),
    /// and 304 (Not Modified).
    pub const fn includes_body(self) -> bool {
        !matches!(self.0, 100..=199 | 204 | 304)
    }

    /// Returns the reason phrase for well known status codes.
    pub const fn phrase(self) -> Option<&'static str> {
        match self.0 {
            100 => Some("Continue"),

            200 => Some("OK"),
            201 => Some("Created"),
            204 => Some("No Content"),

            301 => Some("Moved Permanently"),
            302 => Some("Found"),
            304 => Some("Not Modified"),
            307 => Some("Temporary Redirect"),
            308 => Some("Permanent Redirect"),

            400 => Some("Bad Request"),
            401 => Some("Unauthorized"),
            403 => Some("Forbidden"),
            404 => Some("Not Found"),
            405 => Some("Method Not Allowed"),
            408 => Some("Request Timeout"),
            409 => Some("Conflict"),
            410 => Some("Gone"),
            411 => Some("Length Required"),
            413 => Some("Payload Too Large"),
            414 => Some("URI Too Long"),
            415 => Some("Unsupported Media Type"),
            429 => Some("Too Many Requests"),
            431 => Some("Request Header Fields Too Large"),

            500 => Some("Internal Server Error"),
            501 => Some("Not Implemented"),
            502 => Some("Bad Gateway"),
            503 => Some("Service Unavailable"),
            504 => Some("Gateway Timeout"),
            505 => Some("HTTP Version Not Supported"),

            _ => None,
        }
    }

    /// Same as [`StatusCode::phrase`], but falls back to a generic phrase for
    /// unknown codes.
    pub const fn reason(self) -> &'static str {
        match self.phrase() {
            Some(phrase) => phrase,
            None => "Unknown Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq<u16> for StatusCode {
    fn eq(&self, other: &u16) -> bool {
        self.0.eq(other)
    }
}
