//! Module with HTTP version related types.

use std::fmt;
use std::str::FromStr;

/// HTTP version.
///
/// Both versions are recognised by the parser, but the server only accepts
/// [`Version::Http11`] requests, everything else is answered with `505 HTTP
/// Version Not Supported`.
///
/// RFC 9110 section 2.5.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Version {
    /// HTTP/1.0.
    ///
    /// RFC 1945.
    Http10,
    /// HTTP/1.1.
    ///
    /// RFC 9112.
    Http11,
}

impl Version {
    /// Returns `true` if requests using this version are served.
    pub const fn is_supported(self) -> bool {
        matches!(self, Version::Http11)
    }

    /// Returns the version as string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the [`FromStr`] implementation for [`Version`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UnknownVersion;

impl fmt::Display for UnknownVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown HTTP version")
    }
}

impl std::error::Error for UnknownVersion {}

impl FromStr for Version {
    type Err = UnknownVersion;

    /// The version is case-sensitive (RFC 9112 section 2.3).
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        match version {
            "HTTP/1.0" => Ok(Version::Http10),
            "HTTP/1.1" => Ok(Version::Http11),
            _ => Err(UnknownVersion),
        }
    }
}
