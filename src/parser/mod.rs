//! Incremental HTTP/1.1 request parser.
//!
//! The [`RequestParser`] is restartable: [`RequestParser::parse`] is a pure
//! function of the bytes buffered for a connection, so it can be called again
//! every time more bytes arrive. Feeding a request one byte at a time results
//! in the same [`ParsedRequest`] as feeding it all at once.
//!
//! The parser only checks the syntax and framing of a request, the semantic
//! checks (version, Host header, method, etc.) are done by the
//! [`RequestValidator`].
//!
//! [`RequestValidator`]: crate::RequestValidator

use std::{fmt, str};

use crate::config::Limits;
use crate::header::{HeaderName, Headers};
use crate::{cmp_lower_case, find_crlf, trim_ws, Request, StatusCode};

pub(crate) mod chunked;

/// Incremental request parser.
#[derive(Copy, Clone, Debug)]
pub struct RequestParser {
    limits: Limits,
}

impl RequestParser {
    /// Create a new parser enforcing `limits`.
    pub const fn new(limits: Limits) -> RequestParser {
        RequestParser { limits }
    }

    /// Returns the limits enforced by the parser.
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Parse the first request in `buf`.
    ///
    /// `buf` may contain a partial request, in which case the returned
    /// request's state is [`ParseState::NeedMore`], or more than a single
    /// (pipelined) request, in which case only the first is parsed and the
    /// consumed length marks where the next request starts.
    pub fn parse(&self, buf: &[u8]) -> ParsedRequest {
        let mut request = ParsedRequest::new();
        request.state = match self.parse_into(buf, &mut request) {
            Ok(Some(consumed)) => ParseState::Complete { consumed },
            Ok(None) => ParseState::NeedMore,
            Err(err) => ParseState::Error(err),
        };
        request
    }

    /// Returns `Ok(Some(consumed))` if the request is complete.
    fn parse_into(&self, buf: &[u8], request: &mut ParsedRequest) -> Result<Option<usize>, ParseError> {
        let Some(head_length) = self.find_head_end(buf)? else {
            return Ok(None);
        };
        // Without the final empty line.
        let head = &buf[..head_length - 2];
        self.check_line_lengths(head)?;

        // `head` always ends with CRLF.
        let request_line_end = find_crlf(head).unwrap_or(head.len());
        self.parse_request_line(&head[..request_line_end], request)?;

        let mut raw_headers = vec![httparse::EMPTY_HEADER; self.limits.max_headers()];
        let header_block = &buf[request_line_end + 2..head_length];
        match httparse::parse_headers(header_block, &mut raw_headers) {
            Ok(httparse::Status::Complete((_, raw_headers))) => {
                request.headers = Headers::from_httparse_headers(raw_headers, |headers, name, _| {
                    // RFC 9112 section 6.3 point 5 and RFC 9110 section 7.2.
                    if *name == HeaderName::CONTENT_LENGTH && headers.contains(name) {
                        Err(ParseError::DuplicateContentLength)
                    } else if *name == HeaderName::HOST && headers.contains(name) {
                        Err(ParseError::DuplicateHost)
                    } else {
                        Ok(())
                    }
                })?;
            }
            // We've found the end of the head, so this should never happen.
            Ok(httparse::Status::Partial) => return Err(ParseError::InvalidHeader),
            Err(err) => return Err(ParseError::from_httparse(err)),
        }
        request.headers_parsed = true;

        let body = &buf[head_length..];
        match self.framing(&request.headers)? {
            Framing::None => {
                request.body_parsed = true;
                Ok(Some(head_length))
            }
            Framing::Length(length) => {
                if body.len() < length {
                    return Ok(None);
                }
                request.body = body[..length].to_vec();
                request.body_parsed = true;
                Ok(Some(head_length + length))
            }
            Framing::Chunked => match chunked::decode(body, self.limits.max_body_size())? {
                chunked::Decoded::NeedMore => Ok(None),
                chunked::Decoded::Complete { body, consumed } => {
                    request.body = body;
                    request.body_parsed = true;
                    Ok(Some(head_length + consumed))
                }
            },
        }
    }

    /// Returns the length of the request head, including the empty line, if
    /// the entire head is in `buf`.
    fn find_head_end(&self, buf: &[u8]) -> Result<Option<usize>, ParseError> {
        let max = self.limits.max_header_size();
        let search = &buf[..buf.len().min(max)];
        if let Some(pos) = search.windows(4).position(|w| w == b"\r\n\r\n") {
            return Ok(Some(pos + 4));
        }

        if buf.len() >= max {
            return Err(ParseError::HeadTooLarge);
        }
        // Don't wait for the end of a line that's already too long.
        self.check_line_lengths(buf)?;
        Ok(None)
    }

    /// Check the length of all lines in `head`, including a trailing partial
    /// line.
    fn check_line_lengths(&self, head: &[u8]) -> Result<(), ParseError> {
        let max = self.limits.max_line_length();
        for (n, line) in CrlfLines::new(head).enumerate() {
            if line.len() > max {
                return Err(if n == 0 {
                    ParseError::UriTooLong
                } else {
                    ParseError::LineTooLong
                });
            }
        }
        Ok(())
    }

    fn parse_request_line(&self, line: &[u8], request: &mut ParsedRequest) -> Result<(), ParseError> {
        let line = str::from_utf8(line).map_err(|_| ParseError::InvalidRequestLine)?;
        let mut parts = line.split_ascii_whitespace();
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::InvalidRequestLine);
        };

        if target.len() > self.limits.max_uri_length() {
            return Err(ParseError::UriTooLong);
        }

        request.method = method.to_owned();
        request.target = target.to_owned();
        request.version = version.to_owned();
        Ok(())
    }

    /// Determine the body framing.
    ///
    /// RFC 9112 section 6.3. Both a Transfer-Encoding and a Content-Length
    /// header is rejected later by the validator.
    fn framing(&self, headers: &Headers) -> Result<Framing, ParseError> {
        if is_chunked(headers) {
            return Ok(Framing::Chunked);
        }

        match headers.get_value::<usize>(&HeaderName::CONTENT_LENGTH) {
            Ok(Some(length)) if length > self.limits.max_body_size() => {
                Err(ParseError::PayloadTooLarge)
            }
            Ok(Some(length)) => Ok(Framing::Length(length)),
            // Invalid values are rejected by the validator.
            Ok(None) | Err(_) => Ok(Framing::None),
        }
    }
}

/// Returns `true` if the Transfer-Encoding of `headers` is only `chunked`.
///
/// Multiple Transfer-Encoding headers form a single list of codings (RFC 9110
/// section 5.3), e.g. `chunked` followed by `gzip` is `chunked, gzip`. Only a
/// list with exactly one coding, `chunked`, is accepted.
pub(crate) fn is_chunked(headers: &Headers) -> bool {
    let mut codings = headers
        .get_all(&HeaderName::TRANSFER_ENCODING)
        .flat_map(|value| value.split(|b| *b == b','))
        .map(trim_ws)
        .filter(|coding| !coding.is_empty());
    match (codings.next(), codings.next()) {
        (Some(coding), None) => match str::from_utf8(coding) {
            Ok(coding) => cmp_lower_case("chunked", coding),
            Err(_) => false,
        },
        _ => false,
    }
}

enum Framing {
    None,
    Length(usize),
    Chunked,
}

/// Iterator over the `\r\n` separated lines in a buffer.
struct CrlfLines<'a> {
    buf: Option<&'a [u8]>,
}

impl<'a> CrlfLines<'a> {
    const fn new(buf: &'a [u8]) -> CrlfLines<'a> {
        CrlfLines { buf: Some(buf) }
    }
}

impl<'a> Iterator for CrlfLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.buf?;
        match find_crlf(buf) {
            Some(end) => {
                self.buf = Some(&buf[end + 2..]);
                Some(&buf[..end])
            }
            None => {
                self.buf = None;
                Some(buf)
            }
        }
    }
}

/// A (partially) parsed request.
///
/// Returned by [`RequestParser::parse`].
#[derive(Debug)]
pub struct ParsedRequest {
    method: String,
    target: String,
    version: String,
    headers: Headers,
    body: Vec<u8>,
    headers_parsed: bool,
    body_parsed: bool,
    state: ParseState,
}

impl ParsedRequest {
    const fn new() -> ParsedRequest {
        ParsedRequest {
            method: String::new(),
            target: String::new(),
            version: String::new(),
            headers: Headers::EMPTY,
            body: Vec::new(),
            headers_parsed: false,
            body_parsed: false,
            state: ParseState::NeedMore,
        }
    }

    /// Returns the method as send by the client, empty if the request line
    /// isn't parsed.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request target as send by the client.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the version as send by the client.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the headers, empty if not yet parsed.
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body, empty if not yet parsed.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns `true` if the request line and headers are parsed.
    pub const fn headers_parsed(&self) -> bool {
        self.headers_parsed
    }

    /// Returns `true` if the body is complete.
    pub const fn body_parsed(&self) -> bool {
        self.body_parsed
    }

    /// Returns the parse state.
    pub const fn state(&self) -> &ParseState {
        &self.state
    }

    /// Returns `true` if the request is complete.
    pub const fn is_complete(&self) -> bool {
        matches!(self.state, ParseState::Complete { .. })
    }

    /// Returns the error, if any.
    pub const fn error(&self) -> Option<ParseError> {
        match self.state {
            ParseState::Error(err) => Some(err),
            ParseState::NeedMore | ParseState::Complete { .. } => None,
        }
    }

    /// Returns the number of bytes used by the request, if complete.
    pub const fn consumed(&self) -> Option<usize> {
        match self.state {
            ParseState::Complete { consumed } => Some(consumed),
            ParseState::NeedMore | ParseState::Error(_) => None,
        }
    }

    /// Convert into a typed [`Request`].
    ///
    /// Returns `None` if the request isn't complete, or if the method or
    /// version is unknown. Requests that passed the [`RequestValidator`] always
    /// convert.
    ///
    /// [`RequestValidator`]: crate::RequestValidator
    pub fn into_request(self) -> Option<Request> {
        if !self.is_complete() {
            return None;
        }
        let method = self.method.parse().ok()?;
        let version = self.version.parse().ok()?;
        Some(Request::new(
            method,
            self.target,
            version,
            self.headers,
            self.body,
        ))
    }
}

/// State of a [`ParsedRequest`].
///
/// A request is either still incomplete, or exactly one of complete or
/// invalid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseState {
    /// More bytes are needed.
    NeedMore,
    /// Request is complete and uses the first `consumed` bytes of the buffer.
    Complete {
        /// Number of bytes used by the request.
        consumed: usize,
    },
    /// Request is malformed.
    Error(ParseError),
}

/// Error parsing a request.
///
/// All errors are terminal: the request can't be fixed by receiving more
/// bytes, and the connection should be closed after responding with the
/// [proper status code].
///
/// [proper status code]: ParseError::proper_status_code
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// Request head (request line and headers) is larger than
    /// [`Limits::max_header_size`].
    HeadTooLarge,
    /// A header line is longer than [`Limits::max_line_length`].
    LineTooLong,
    /// Request line is longer than [`Limits::max_line_length`], or the request
    /// target is longer than [`Limits::max_uri_length`].
    UriTooLong,
    /// Request line doesn't consist of exactly three tokens.
    InvalidRequestLine,
    /// Malformed header line, e.g. missing a colon.
    InvalidHeader,
    /// More headers than [`Limits::max_headers`].
    TooManyHeaders,
    /// Multiple Content-Length headers, even with identical values.
    DuplicateContentLength,
    /// Multiple Host headers.
    DuplicateHost,
    /// Chunk size line is empty, contains a non-hex character or overflows.
    InvalidChunkSize,
    /// Chunk data isn't followed by CRLF.
    MissingChunkCrlf,
    /// Body is larger than [`Limits::max_body_size`].
    PayloadTooLarge,
}

impl ParseError {
    /// Returns the proper status code for a given error.
    pub const fn proper_status_code(self) -> StatusCode {
        match self {
            ParseError::InvalidRequestLine
            | ParseError::InvalidHeader
            | ParseError::DuplicateContentLength
            | ParseError::DuplicateHost
            | ParseError::InvalidChunkSize
            | ParseError::MissingChunkCrlf => StatusCode::BAD_REQUEST,
            // RFC 6585 section 5.
            ParseError::HeadTooLarge | ParseError::LineTooLong | ParseError::TooManyHeaders => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            ParseError::UriTooLong => StatusCode::URI_TOO_LONG,
            ParseError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    // NOTE: not implemented using the From trait because it's not part of the
    // public API.
    fn from_httparse(err: httparse::Error) -> ParseError {
        match err {
            httparse::Error::TooManyHeaders => ParseError::TooManyHeaders,
            httparse::Error::HeaderName
            | httparse::Error::HeaderValue
            | httparse::Error::NewLine
            | httparse::Error::Token
            | httparse::Error::Version
            | httparse::Error::Status => ParseError::InvalidHeader,
        }
    }

    /// Returns a static error message for the error.
    pub const fn as_str(self) -> &'static str {
        match self {
            ParseError::HeadTooLarge => "head too large",
            ParseError::LineTooLong => "header line too long",
            ParseError::UriTooLong => "request target too long",
            ParseError::InvalidRequestLine => "invalid request line",
            ParseError::InvalidHeader => "invalid header",
            ParseError::TooManyHeaders => "too many headers",
            ParseError::DuplicateContentLength => "duplicate Content-Length header",
            ParseError::DuplicateHost => "duplicate Host header",
            ParseError::InvalidChunkSize => "invalid chunk size",
            ParseError::MissingChunkCrlf => "missing CRLF after chunk",
            ParseError::PayloadTooLarge => "body too large",
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ParseError {}
