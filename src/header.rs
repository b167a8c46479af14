//! Header related types.
//!
//! This module has three main types:
//!  * [`Headers`] is a list of multiple headers,
//!  * [`Header`] is a single header, and finally
//!  * [`HeaderName`] is the name of a header.
//!
//! Header names are case-insensitive, they are folded to lowercase when a
//! [`HeaderName`] is created, so lookups never have to care about case.

use std::borrow::Cow;
use std::iter::FusedIterator;
use std::{fmt, str};

use crate::{cmp_lower_case, is_lower_case};

/// List of headers.
#[derive(Clone)]
pub struct Headers {
    /// All values appended in a single allocation.
    values: Vec<u8>,
    /// All parts of the headers.
    parts: Vec<HeaderPart>,
}

#[derive(Clone)]
struct HeaderPart {
    name: HeaderName,
    /// Indices into `Headers.values`.
    start: usize,
    end: usize,
}

impl Headers {
    /// Empty list of headers.
    pub const EMPTY: Headers = Headers {
        values: Vec::new(),
        parts: Vec::new(),
    };

    /// Creates new `Headers` from `raw_headers` parsed by httparse.
    ///
    /// Values are trimmed of surrounding whitespace. `f` is called for each
    /// header before it's added, returning an error stops the conversion.
    pub(crate) fn from_httparse_headers<F, E>(
        raw_headers: &[httparse::Header<'_>],
        mut f: F,
    ) -> Result<Headers, E>
    where
        F: FnMut(&Headers, &HeaderName, &[u8]) -> Result<(), E>,
    {
        let values_len = raw_headers.iter().map(|h| h.value.len()).sum();
        let mut headers = Headers {
            values: Vec::with_capacity(values_len),
            parts: Vec::with_capacity(raw_headers.len()),
        };
        for header in raw_headers {
            let name = HeaderName::from_str(header.name);
            let value = crate::trim_ws(header.value);
            f(&headers, &name, value)?;
            headers._append(name, value);
        }
        Ok(headers)
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if this is empty.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Append a new header.
    ///
    /// # Notes
    ///
    /// This doesn't check for duplicate headers. If you don't want duplicate
    /// headers use [`Headers::insert`].
    pub fn append(&mut self, header: Header<'_>) {
        self._append(header.name, header.value);
    }

    /// Insert `header`, removing all existing headers with the same name.
    pub fn insert(&mut self, header: Header<'_>) {
        self.remove_all(&header.name);
        self._append(header.name, header.value);
    }

    fn _append(&mut self, name: HeaderName, value: &[u8]) {
        debug_assert!(no_crlf(value), "header value contains CRLF ('\\r\\n')");
        let start = self.values.len();
        self.values.extend_from_slice(value);
        let end = self.values.len();
        self.parts.push(HeaderPart { name, start, end });
    }

    /// Returns `true` if a header with `name` is present.
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.parts.iter().any(|part| part.name == *name)
    }

    /// Get the first header with `name`, if any.
    pub fn get(&self, name: &HeaderName) -> Option<Header<'_>> {
        self.parts
            .iter()
            .find(|part| part.name == *name)
            .map(|part| Header {
                name: part.name.clone(),
                value: &self.values[part.start..part.end],
            })
    }

    /// Get all header values with `name`.
    pub fn get_all<'h>(&'h self, name: &HeaderName) -> impl Iterator<Item = &'h [u8]> + 'h {
        let name = name.clone();
        self.parts
            .iter()
            .filter(move |part| part.name == name)
            .map(move |part| &self.values[part.start..part.end])
    }

    /// Get the header's value with `name`, if any.
    ///
    /// This returns `Ok(None)` if there is no header with `name` and `Err(..)`
    /// in case [`FromHeaderValue`] for `T` returns an error.
    pub fn get_value<'a, T>(&'a self, name: &HeaderName) -> Result<Option<T>, T::Err>
    where
        T: FromHeaderValue<'a>,
    {
        match self.get_bytes(name) {
            Some(value) => FromHeaderValue::from_bytes(value).map(Some),
            None => Ok(None),
        }
    }

    /// Get the header's value with `name` as byte slice, if any.
    pub fn get_bytes<'a>(&'a self, name: &HeaderName) -> Option<&'a [u8]> {
        self.parts
            .iter()
            .find(|part| part.name == *name)
            .map(|part| &self.values[part.start..part.end])
    }

    /// Remove all headers with `name`.
    ///
    /// The bytes of the value remain in the values buffer until the headers
    /// are dropped.
    pub fn remove_all(&mut self, name: &HeaderName) {
        self.parts.retain(|part| part.name != *name);
    }

    /// Returns an iterator that iterates over all headers in the order they
    /// were added.
    pub const fn iter(&self) -> Iter<'_> {
        Iter {
            headers: self,
            pos: 0,
        }
    }
}

impl Default for Headers {
    fn default() -> Headers {
        Headers::EMPTY
    }
}

impl<'v> FromIterator<Header<'v>> for Headers {
    fn from_iter<I>(iter: I) -> Headers
    where
        I: IntoIterator<Item = Header<'v>>,
    {
        let mut headers = Headers::EMPTY;
        headers.extend(iter);
        headers
    }
}

impl<'v> Extend<Header<'v>> for Headers {
    fn extend<I>(&mut self, iter: I)
    where
        I: IntoIterator<Item = Header<'v>>,
    {
        let iter = iter.into_iter();
        let (iter_len, _) = iter.size_hint();
        // Make a guess of 10 bytes per header value on average.
        self.values.reserve(iter_len * 10);
        self.parts.reserve(iter_len);
        for header in iter {
            self._append(header.name, header.value);
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = Header<'a>;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_map();
        for part in &self.parts {
            let value = &self.values[part.start..part.end];
            if let Ok(str) = str::from_utf8(value) {
                let _ = f.entry(&part.name, &str);
            } else {
                let _ = f.entry(&part.name, &value);
            }
        }
        f.finish()
    }
}

/// Iterator for [`Headers`], see [`Headers::iter`].
#[derive(Debug)]
pub struct Iter<'a> {
    headers: &'a Headers,
    pos: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = Header<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.headers.parts.get(self.pos).map(|part| {
            self.pos += 1;
            Header {
                name: part.name.clone(),
                value: &self.headers.values[part.start..part.end],
            }
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }
}

impl<'a> ExactSizeIterator for Iter<'a> {
    fn len(&self) -> usize {
        self.headers.len() - self.pos
    }
}

impl<'a> FusedIterator for Iter<'a> {}

/// HTTP header.
///
/// RFC 9110 section 6.3.
#[derive(Clone, PartialEq, Eq)]
pub struct Header<'v> {
    name: HeaderName,
    value: &'v [u8],
}

impl<'v> Header<'v> {
    /// Create a new `Header`.
    ///
    /// # Notes
    ///
    /// `value` MUST NOT contain `\r\n`.
    pub const fn new(name: HeaderName, value: &'v [u8]) -> Header<'v> {
        debug_assert!(no_crlf(value), "header value contains CRLF ('\\r\\n')");
        Header { name, value }
    }

    /// Returns the name of the header.
    pub const fn name(&self) -> &HeaderName {
        &self.name
    }

    /// Returns the value of the header.
    pub const fn value(&self) -> &'v [u8] {
        self.value
    }
}

/// Returns `true` if `value` does not contain `\r\n`.
const fn no_crlf(value: &[u8]) -> bool {
    let mut i = 1;
    while i < value.len() {
        if value[i - 1] == b'\r' && value[i] == b'\n' {
            return false;
        }
        i += 1;
    }
    true
}

impl<'v> fmt::Debug for Header<'v> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("Header");
        let _ = f.field("name", &self.name);
        if let Ok(str) = str::from_utf8(self.value) {
            let _ = f.field("value", &str);
        } else {
            let _ = f.field("value", &self.value);
        }
        f.finish()
    }
}

/// HTTP header name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct HeaderName {
    /// The value MUST be lower case.
    inner: Cow<'static, str>,
}

/// Macro to create [`HeaderName`] constants.
macro_rules! known_headers {
    ($(
        $length: tt: [
            $( ( $const_name: ident, $http_name: expr, $doc: expr ) $(,)? ),+
        ],
    )+) => {
        $($(
            #[doc = $doc]
            pub const $const_name: HeaderName = HeaderName::from_lowercase($http_name);
        )+)+

        /// Create a new HTTP `HeaderName`, folding `name` to lowercase.
        ///
        /// # Notes
        ///
        /// If `name` is static prefer to use [`HeaderName::from_lowercase`].
        #[allow(clippy::should_implement_trait)]
        pub fn from_str(name: &str) -> HeaderName {
            // First match on the length of `name`, then do a case-insensitive
            // compare with all known headers of the same length.
            match name.len() {
                $(
                $length => {
                    $(
                    if cmp_lower_case($http_name, name) {
                        return HeaderName::$const_name;
                    }
                    )+
                }
                )+
                _ => {}
            }
            HeaderName::from(name.to_owned())
        }
    }
}

impl HeaderName {
    // NOTE: adding here also means adding to the
    // `functional::header::from_str_known_headers` test.
    known_headers!(
        4: [
            (DATE, "date", "Date.\n\nRFC 9110 section 6.6.1."),
            (HOST, "host", "Host.\n\nRFC 9110 section 7.2."),
        ],
        6: [
            (COOKIE, "cookie", "Cookie.\n\nRFC 6265."),
            (SERVER, "server", "Server.\n\nRFC 9110 section 10.2.4."),
        ],
        8: [
            (LOCATION, "location", "Location.\n\nRFC 9110 section 10.2.2."),
        ],
        10: [
            (CONNECTION, "connection", "Connection.\n\nRFC 9110 section 7.6.1."),
            (KEEP_ALIVE, "keep-alive", "Keep-Alive.\n\nRFC 2068."),
            (SET_COOKIE, "set-cookie", "Set-Cookie.\n\nRFC 6265."),
            (USER_AGENT, "user-agent", "User-Agent.\n\nRFC 9110 section 10.1.5."),
        ],
        12: [
            (CONTENT_TYPE, "content-type", "Content-Type.\n\nRFC 9110 section 8.3."),
        ],
        14: [
            (CONTENT_LENGTH, "content-length", "Content-Length.\n\nRFC 9110 section 8.6."),
        ],
        17: [
            (TRANSFER_ENCODING, "transfer-encoding", "Transfer-Encoding.\n\nRFC 9112 section 6.1."),
        ],
    );

    /// Create a new HTTP `HeaderName`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not all ASCII lowercase.
    pub const fn from_lowercase(name: &'static str) -> HeaderName {
        assert!(is_lower_case(name), "header name not lowercase");
        HeaderName {
            inner: Cow::Borrowed(name),
        }
    }

    /// Returns `true` if `self` is heap allocated.
    ///
    /// # Notes
    ///
    /// This is only here to test [`HeaderName::from_str`], not part of the
    /// stable API.
    #[doc(hidden)]
    pub const fn is_heap_allocated(&self) -> bool {
        matches!(self.inner, Cow::Owned(_))
    }
}

impl From<String> for HeaderName {
    fn from(mut name: String) -> HeaderName {
        name.make_ascii_lowercase();
        HeaderName {
            inner: Cow::Owned(name),
        }
    }
}

impl AsRef<str> for HeaderName {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl PartialEq<str> for HeaderName {
    fn eq(&self, other: &str) -> bool {
        // NOTE: `self` is always lowercase, per the comment on the `inner`
        // field.
        cmp_lower_case(&self.inner, other)
    }
}

impl PartialEq<&'_ str> for HeaderName {
    fn eq(&self, other: &&str) -> bool {
        self.eq(*other)
    }
}

impl fmt::Debug for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl fmt::Display for HeaderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Analogous trait to [`FromStr`].
///
/// The main use case for this trait is [`Headers::get_value`].
///
/// [`FromStr`]: std::str::FromStr
pub trait FromHeaderValue<'a>: Sized {
    /// Error returned by parsing the bytes.
    type Err;

    /// Parse the `value`.
    fn from_bytes(value: &'a [u8]) -> Result<Self, Self::Err>;
}

/// Error returned by the [`FromHeaderValue`] implementation for numbers, e.g.
/// `usize`.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseIntError;

impl fmt::Display for ParseIntError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid integer")
    }
}

impl std::error::Error for ParseIntError {}

/// Only accepts ASCII digits, so signs and whitespace are rejected.
macro_rules! int_impl {
    ($( $ty: ty ),+) => {
        $(
        impl FromHeaderValue<'_> for $ty {
            type Err = ParseIntError;

            fn from_bytes(src: &[u8]) -> Result<Self, Self::Err> {
                if src.is_empty() {
                    return Err(ParseIntError);
                }

                let mut value: $ty = 0;
                for b in src.iter().copied() {
                    if !b.is_ascii_digit() {
                        return Err(ParseIntError);
                    }
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(<$ty>::from(b - b'0')))
                        .ok_or(ParseIntError)?;
                }
                Ok(value)
            }
        }
        )+
    };
}

int_impl!(u16, u32, u64, usize);

impl<'a> FromHeaderValue<'a> for &'a str {
    type Err = str::Utf8Error;

    fn from_bytes(value: &'a [u8]) -> Result<Self, Self::Err> {
        str::from_utf8(value)
    }
}
