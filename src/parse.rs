use crate::StatusCode;

/// Outcome of trying to get a single request out of a connection's buffer.
///
/// Returned by [`RequestValidator::validate`] and used by the server to decide
/// whether to wait for more bytes, dispatch a request or respond with an
/// error.
///
/// [`RequestValidator::validate`]: crate::RequestValidator::validate
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParseResult {
    /// The buffer doesn't yet hold a complete request.
    NeedMore,
    /// A complete and valid request was found, it spans the first `consumed`
    /// bytes of the buffer.
    ///
    /// `consumed` is never larger than the buffer that was parsed.
    Complete {
        /// Number of bytes used by the request, including its body.
        consumed: usize,
    },
    /// The request is invalid and must be answered with the status code.
    Error(StatusCode),
}

impl ParseResult {
    /// Returns `true` if more bytes are needed.
    pub const fn is_need_more(self) -> bool {
        matches!(self, ParseResult::NeedMore)
    }

    /// Returns `true` if a complete request was found.
    pub const fn is_complete(self) -> bool {
        matches!(self, ParseResult::Complete { .. })
    }

    /// Returns `true` if the request is invalid.
    pub const fn is_error(self) -> bool {
        matches!(self, ParseResult::Error(..))
    }

    /// Returns the error status code, if any.
    pub const fn status_code(self) -> Option<StatusCode> {
        match self {
            ParseResult::Error(status) => Some(status),
            ParseResult::NeedMore | ParseResult::Complete { .. } => None,
        }
    }

    /// Returns the number of bytes consumed, if complete.
    pub const fn consumed(self) -> Option<usize> {
        match self {
            ParseResult::Complete { consumed } => Some(consumed),
            ParseResult::NeedMore | ParseResult::Error(..) => None,
        }
    }
}
