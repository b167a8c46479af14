use crate::config::Limits;
use crate::header::{FromHeaderValue, HeaderName};
use crate::parser::{is_chunked, ParseState, ParsedRequest};
use crate::{Method, ParseResult, StatusCode, Version};

/// Semantic checks on a parsed request.
///
/// The checks are applied in order, the first failing check determines the
/// result:
///
/// 1. Incomplete request: [`ParseResult::NeedMore`].
/// 2. Parse error: the error's [proper status code].
/// 3. Version other than HTTP/1.1: `505 HTTP Version Not Supported`.
/// 4. Missing Host header: `400 Bad Request`.
/// 5. Unsupported method: `501 Not Implemented`.
/// 6. POST without Content-Length or Transfer-Encoding: `411 Length Required`.
/// 7. Content-Length empty or not a number: `400 Bad Request`, larger than the
///    maximum body size: `413 Payload Too Large`.
/// 8. Transfer-Encoding other than only `chunked`, combining all
///    Transfer-Encoding headers: `501 Not Implemented`, chunked together with
///    Content-Length: `400 Bad Request`.
///
/// [proper status code]: crate::ParseError::proper_status_code
#[derive(Copy, Clone, Debug)]
pub struct RequestValidator {
    max_body_size: usize,
}

impl RequestValidator {
    /// Create a new validator using the maximum body size from `limits`.
    pub const fn new(limits: &Limits) -> RequestValidator {
        RequestValidator {
            max_body_size: limits.max_body_size(),
        }
    }

    /// Validate `request`.
    ///
    /// On success returns [`ParseResult::Complete`] with the number of bytes
    /// the request used, which the caller should remove from the buffer.
    pub fn validate(&self, request: &ParsedRequest) -> ParseResult {
        let consumed = match request.state() {
            ParseState::NeedMore => return ParseResult::NeedMore,
            ParseState::Error(err) => return ParseResult::Error(err.proper_status_code()),
            ParseState::Complete { consumed } => *consumed,
        };

        match request.version().parse::<Version>() {
            Ok(version) if version.is_supported() => {}
            _ => return ParseResult::Error(StatusCode::HTTP_VERSION_NOT_SUPPORTED),
        }

        let headers = request.headers();
        if !headers.contains(&HeaderName::HOST) {
            return ParseResult::Error(StatusCode::BAD_REQUEST);
        }

        let method = match request.method().parse::<Method>() {
            Ok(method) if method.is_supported() => method,
            _ => return ParseResult::Error(StatusCode::NOT_IMPLEMENTED),
        };

        let content_length = headers.get_bytes(&HeaderName::CONTENT_LENGTH);
        let transfer_encoding = headers.contains(&HeaderName::TRANSFER_ENCODING);
        if method.requires_body() && content_length.is_none() && !transfer_encoding {
            return ParseResult::Error(StatusCode::LENGTH_REQUIRED);
        }

        if let Some(value) = content_length {
            match usize::from_bytes(value) {
                Ok(length) if length > self.max_body_size => {
                    return ParseResult::Error(StatusCode::PAYLOAD_TOO_LARGE)
                }
                Ok(_) => {}
                Err(_) => return ParseResult::Error(StatusCode::BAD_REQUEST),
            }
        }

        if transfer_encoding {
            if !is_chunked(headers) {
                return ParseResult::Error(StatusCode::NOT_IMPLEMENTED);
            }
            // Framing ambiguity, possible request smuggling (RFC 9112 section
            // 6.1).
            if content_length.is_some() {
                return ParseResult::Error(StatusCode::BAD_REQUEST);
            }
        }

        ParseResult::Complete { consumed }
    }
}
