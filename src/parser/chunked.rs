//! Decoder for the chunked transfer coding.
//!
//! RFC 9112 section 7.1:
//!
//! ```text
//! chunked-body   = *chunk
//!                  last-chunk
//!                  trailer-section
//!                  CRLF
//!
//! chunk          = chunk-size [ chunk-ext ] CRLF
//!                  chunk-data CRLF
//! chunk-size     = 1*HEXDIG
//! last-chunk     = 1*("0") [ chunk-ext ] CRLF
//! ```
//!
//! Chunk extensions and trailer fields are not supported, both are rejected as
//! malformed framing.
//!
//! The decoder distinguishes between bytes that are merely incomplete and bytes
//! that are already invalid: a partial size line made up of hex digits is
//! [`Decoded::NeedMore`], a single invalid byte anywhere is an error even if
//! the line isn't complete yet.

use super::ParseError;
use crate::find_crlf;

/// Result of [`decode`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Decoded {
    /// Body isn't complete yet.
    NeedMore,
    /// The entire body is decoded.
    Complete {
        body: Vec<u8>,
        /// Number of bytes used, up to and including the CRLF after the last
        /// chunk.
        consumed: usize,
    },
}

/// Decode a chunked body at the start of `buf`.
///
/// Returns [`ParseError::PayloadTooLarge`] if the decoded body would exceed
/// `max_body_size`.
pub(crate) fn decode(buf: &[u8], max_body_size: usize) -> Result<Decoded, ParseError> {
    let mut body = Vec::new();
    let mut pos = 0;
    loop {
        let Some(size_line_end) = find_crlf(&buf[pos..]) else {
            // Incomplete size line, but check what we got so far.
            check_partial_size(&buf[pos..])?;
            return Ok(Decoded::NeedMore);
        };
        let size = parse_size(&buf[pos..pos + size_line_end])?;
        pos += size_line_end + 2;

        if size > max_body_size - body.len() {
            return Err(ParseError::PayloadTooLarge);
        }

        if size == 0 {
            // Last chunk, must be followed by the final CRLF (we don't support
            // trailers).
            return if expect_crlf(&buf[pos..])? {
                Ok(Decoded::Complete {
                    body,
                    consumed: pos + 2,
                })
            } else {
                Ok(Decoded::NeedMore)
            };
        }

        if buf.len() - pos < size {
            return Ok(Decoded::NeedMore);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        pos += size;

        if !expect_crlf(&buf[pos..])? {
            return Ok(Decoded::NeedMore);
        }
        pos += 2;
    }
}

/// Parse a complete chunk size line, excluding the CRLF.
fn parse_size(line: &[u8]) -> Result<usize, ParseError> {
    if line.is_empty() {
        return Err(ParseError::InvalidChunkSize);
    }
    let mut size: usize = 0;
    for b in line.iter().copied() {
        let digit = hex_value(b).ok_or(ParseError::InvalidChunkSize)?;
        size = size
            .checked_mul(16)
            .and_then(|size| size.checked_add(digit))
            .ok_or(ParseError::InvalidChunkSize)?;
    }
    Ok(size)
}

/// Check the size line we've received so far, which doesn't contain a CRLF.
fn check_partial_size(partial: &[u8]) -> Result<(), ParseError> {
    let digits = match partial {
        // Can't yet tell if the `\r` is followed by `\n`.
        [digits @ .., b'\r'] => {
            if digits.is_empty() {
                return Err(ParseError::InvalidChunkSize);
            }
            digits
        }
        digits => digits,
    };
    if digits.is_empty() {
        return Ok(());
    }
    parse_size(digits).map(|_| ())
}

/// Returns `Ok(true)` if `buf` starts with CRLF, `Ok(false)` if `buf` is a
/// prefix of CRLF.
fn expect_crlf(buf: &[u8]) -> Result<bool, ParseError> {
    match buf {
        [b'\r', b'\n', ..] => Ok(true),
        [] | [b'\r'] => Ok(false),
        _ => Err(ParseError::MissingChunkCrlf),
    }
}

const fn hex_value(b: u8) -> Option<usize> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as usize),
        b'a'..=b'f' => Some((b - b'a' + 10) as usize),
        b'A'..=b'F' => Some((b - b'A' + 10) as usize),
        _ => None,
    }
}
