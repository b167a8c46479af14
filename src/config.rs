//! Module with the server configuration types.
//!
//! The configuration is a static tree of values:
//!  * [`Config`] holds the settings of the event loop and all virtual hosts,
//!  * [`ServerConfig`] is a single virtual host, and
//!  * [`Limits`] are the size limits applied while parsing requests.
//!
//! All types use a builder pattern, starting from a default value, e.g.
//! [`Config::default`] or [`ServerConfig::new`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::StatusCode;

/// Size limits applied to incoming requests.
///
/// Exceeding any of these limits results in an error response, see
/// [`ParseError`] for the mapping to status codes.
///
/// [`ParseError`]: crate::ParseError
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    max_header_size: usize,
    max_line_length: usize,
    max_uri_length: usize,
    max_headers: usize,
    max_body_size: usize,
    /// If `None` it's based on the other limits, see
    /// [`Limits::max_input_size`].
    max_input_size: Option<usize>,
}

/// Allowance for the chunk size lines and CRLFs of a chunked body on top of
/// the maximum head and body sizes.
const FRAMING_ALLOWANCE: usize = 64 * 1024;

impl Limits {
    /// Default maximum size of the request head, in bytes.
    pub const DEFAULT_MAX_HEADER_SIZE: usize = 16 * 1024;
    /// Default maximum length of a single line in the head, in bytes.
    pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;
    /// Default maximum length of the request target, in bytes.
    pub const DEFAULT_MAX_URI_LENGTH: usize = 8000;
    /// Default maximum number of headers.
    pub const DEFAULT_MAX_HEADERS: usize = 64;
    /// Default maximum size of the request body, in bytes.
    pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

    /// Set the maximum size of the request head (request line and headers).
    pub fn with_max_header_size(mut self, size: usize) -> Limits {
        assert!(size >= 4, "maximum header size must fit the head terminator");
        self.max_header_size = size;
        self
    }

    /// Returns the maximum size of the request head.
    pub const fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    /// Set the maximum length of a single line in the request head.
    pub fn with_max_line_length(mut self, length: usize) -> Limits {
        self.max_line_length = length;
        self
    }

    /// Returns the maximum length of a single line in the request head.
    pub const fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Set the maximum length of the request target.
    pub fn with_max_uri_length(mut self, length: usize) -> Limits {
        self.max_uri_length = length;
        self
    }

    /// Returns the maximum length of the request target.
    pub const fn max_uri_length(&self) -> usize {
        self.max_uri_length
    }

    /// Set the maximum number of headers in a request.
    pub fn with_max_headers(mut self, max: usize) -> Limits {
        self.max_headers = max;
        self
    }

    /// Returns the maximum number of headers in a request.
    pub const fn max_headers(&self) -> usize {
        self.max_headers
    }

    /// Set the maximum size of a request body, for both Content-Length and
    /// chunked bodies.
    pub fn with_max_body_size(mut self, size: usize) -> Limits {
        self.max_body_size = size;
        self
    }

    /// Returns the maximum size of a request body.
    pub const fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Set the maximum number of unprocessed bytes buffered for a single
    /// connection.
    pub fn with_max_input_size(mut self, size: usize) -> Limits {
        self.max_input_size = Some(size);
        self
    }

    /// Returns the maximum number of unprocessed bytes buffered for a single
    /// connection.
    ///
    /// Defaults to the maximum head size plus the maximum body size plus 64 KiB
    /// for chunked framing.
    pub const fn max_input_size(&self) -> usize {
        match self.max_input_size {
            Some(size) => size,
            None => self.max_header_size + self.max_body_size + FRAMING_ALLOWANCE,
        }
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            max_header_size: Limits::DEFAULT_MAX_HEADER_SIZE,
            max_line_length: Limits::DEFAULT_MAX_LINE_LENGTH,
            max_uri_length: Limits::DEFAULT_MAX_URI_LENGTH,
            max_headers: Limits::DEFAULT_MAX_HEADERS,
            max_body_size: Limits::DEFAULT_MAX_BODY_SIZE,
            max_input_size: None,
        }
    }
}

/// Configuration of a single virtual host.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    listen: Vec<SocketAddr>,
    server_names: Vec<String>,
    client_max_body_size: Option<usize>,
    error_pages: HashMap<StatusCode, PathBuf>,
}

impl ServerConfig {
    /// Create a new virtual host listening on `address`.
    pub fn new(address: SocketAddr) -> ServerConfig {
        ServerConfig {
            listen: vec![address],
            server_names: Vec::new(),
            client_max_body_size: None,
            error_pages: HashMap::new(),
        }
    }

    /// Also listen on `address`.
    pub fn with_listen(mut self, address: SocketAddr) -> ServerConfig {
        if !self.listen.contains(&address) {
            self.listen.push(address);
        }
        self
    }

    /// Returns the addresses this virtual host listens on.
    pub fn listen(&self) -> &[SocketAddr] {
        &self.listen
    }

    /// Add a name to match against the Host header of requests.
    pub fn with_server_name<N: Into<String>>(mut self, name: N) -> ServerConfig {
        self.server_names.push(name.into());
        self
    }

    /// Returns the server names.
    pub fn server_names(&self) -> &[String] {
        &self.server_names
    }

    /// Returns `true` if one of the server names matches `host`.
    ///
    /// `host` must already have the port removed. The comparison is
    /// case-insensitive.
    pub fn matches_name(&self, host: &str) -> bool {
        self.server_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(host))
    }

    /// Set the maximum size of request bodies for this virtual host.
    ///
    /// Larger bodies are answered with `413 Payload Too Large`. This can only
    /// lower the global [`Limits::max_body_size`].
    pub fn with_client_max_body_size(mut self, size: usize) -> ServerConfig {
        self.client_max_body_size = Some(size);
        self
    }

    /// Returns the maximum size of request bodies, if set.
    pub const fn client_max_body_size(&self) -> Option<usize> {
        self.client_max_body_size
    }

    /// Use the file at `path` as body for error responses with `status`.
    pub fn with_error_page<P: Into<PathBuf>>(mut self, status: StatusCode, path: P) -> ServerConfig {
        let _ = self.error_pages.insert(status, path.into());
        self
    }

    /// Returns the path of the error page for `status`, if any.
    pub fn error_page(&self, status: StatusCode) -> Option<&Path> {
        self.error_pages.get(&status).map(PathBuf::as_path)
    }

    /// Returns all configured error pages.
    pub fn error_pages(&self) -> impl Iterator<Item = (StatusCode, &Path)> {
        self.error_pages
            .iter()
            .map(|(status, path)| (*status, path.as_path()))
    }
}

/// Configuration of the [`Server`].
///
/// [`Server`]: crate::Server
#[derive(Clone, Debug)]
#[must_use = "`Config` doesn't do anything until it's passed to `Server::new`"]
pub struct Config {
    servers: Vec<ServerConfig>,
    limits: Limits,
    max_connections: usize,
    idle_timeout: Duration,
    write_timeout: Duration,
    max_requests: usize,
    tick: Duration,
}

impl Config {
    /// Default maximum number of concurrent connections.
    pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;
    /// Default idle timeout.
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
    /// Default write timeout.
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default maximum number of requests per connection.
    pub const DEFAULT_MAX_REQUESTS: usize = 100;
    /// Default interval of the event loop.
    pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

    /// Add a virtual host.
    ///
    /// If multiple virtual hosts listen on the same address the first one
    /// added is the default for that address.
    pub fn with_server(mut self, server: ServerConfig) -> Config {
        self.servers.push(server);
        self
    }

    /// Returns all virtual hosts.
    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    /// Set the request size limits.
    pub fn with_limits(mut self, limits: Limits) -> Config {
        self.limits = limits;
        self
    }

    /// Returns the request size limits.
    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Set the maximum number of concurrent connections, connections accepted
    /// above this number are closed immediately.
    pub fn with_max_connections(mut self, max: usize) -> Config {
        self.max_connections = max;
        self
    }

    /// Returns the maximum number of concurrent connections.
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Set the time after which a connection without any activity and nothing
    /// to write is closed.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Config {
        self.idle_timeout = timeout;
        self
    }

    /// Returns the idle timeout.
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Set the time after which a connection that can't write its pending
    /// response is closed.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Config {
        self.write_timeout = timeout;
        self
    }

    /// Returns the write timeout.
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Set the maximum number of requests handled on a single connection.
    pub fn with_max_requests(mut self, max: usize) -> Config {
        assert!(max != 0, "Can't handle zero requests per connection, 1 is the minimum");
        self.max_requests = max;
        self
    }

    /// Returns the maximum number of requests per connection.
    pub const fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Set the maximum time the event loop waits for events, this determines
    /// how often timeouts are checked.
    pub fn with_tick(mut self, tick: Duration) -> Config {
        assert!(!tick.is_zero(), "Can't use a zero tick interval");
        self.tick = tick;
        self
    }

    /// Returns the tick interval.
    pub const fn tick(&self) -> Duration {
        self.tick
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            servers: Vec::new(),
            limits: Limits::default(),
            max_connections: Config::DEFAULT_MAX_CONNECTIONS,
            idle_timeout: Config::DEFAULT_IDLE_TIMEOUT,
            write_timeout: Config::DEFAULT_WRITE_TIMEOUT,
            max_requests: Config::DEFAULT_MAX_REQUESTS,
            tick: Config::DEFAULT_TICK,
        }
    }
}
