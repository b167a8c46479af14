//! Tests for the [`Server`], using real TCP connections.

use std::fs;
use std::io::{self, Read, Write};
use std::net::{self, SocketAddr};
use std::str;
use std::sync::Once;
use std::thread::{self, sleep};
use std::time::{Duration, Instant};

use webserv::{
    Config, HeaderName, Limits, Request, Response, Server, ServerConfig, ShutdownHandle,
    StatusCode,
};

const TIMEOUT: Duration = Duration::from_secs(2);
const LARGE_BODY_SIZE: usize = 4 * 1024 * 1024;

fn handler(request: &Request, server: &ServerConfig) -> Response {
    match request.path() {
        "/" => Response::build_new(StatusCode::OK).with_body(b"OK".to_vec()),
        "/echo" => Response::build_new(StatusCode::OK).with_body(request.body().to_vec()),
        "/host" => {
            let name = server.server_names().first().map_or("", String::as_str);
            Response::build_new(StatusCode::OK).with_body(name.as_bytes().to_vec())
        }
        "/close" => Response::build_new(StatusCode::OK)
            .with_header(HeaderName::CONNECTION, b"close")
            .with_body(b"bye".to_vec()),
        "/large" => Response::build_new(StatusCode::OK).with_body(vec![b'a'; LARGE_BODY_SIZE]),
        "/not-found" => Response::build_new(StatusCode::NOT_FOUND),
        path => Response::build_new(StatusCode::OK).with_body(path.as_bytes().to_vec()),
    }
}

/// Logs the output of the server to standard error.
fn init_logger() {
    static LOGGER: Once = Once::new();
    LOGGER.call_once(|| std_logger::Config::logfmt().init());
}

fn any_address() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn default_config() -> Config {
    Config::default().with_server(ServerConfig::new(any_address()).with_server_name("localhost"))
}

#[test]
fn get() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Content-Length"), Some("2"));
    assert_eq!(response.header("Connection"), Some("keep-alive"));
    assert_eq!(response.header("Keep-Alive"), Some("timeout=60, max=99"));
    assert!(response.header("Date").is_some());
    assert_eq!(response.body, b"OK");

    // Connection remains usable.
    client.send(b"GET /second HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Keep-Alive"), Some("timeout=60, max=98"));
    assert_eq!(response.body, b"/second");
}

#[test]
fn request_send_in_parts() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    let request = b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 11\r\n\r\nHello world";
    for part in request.chunks(7) {
        client.send(part);
        sleep(Duration::from_millis(5));
    }
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"Hello world");
}

#[test]
fn pipelined_requests() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(
        b"GET /first HTTP/1.1\r\nHost: localhost\r\n\r\n\
          POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 6\r\n\r\nsecond\
          GET /third HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );
    for expected in [&b"/first"[..], b"second", b"/third"] {
        let response = client.response();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, expected);
    }
}

#[test]
fn chunked_request_body() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(
        b"POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n\
          4\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\n\r\n",
    );
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"Wikipedia in\r\n\r\nchunks.");
}

#[test]
fn invalid_requests() {
    let tests: [(&[u8], u16); 6] = [
        (
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n",
            400,
        ),
        (
            b"POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: gzip\r\n\r\n",
            501,
        ),
        (b"GET / HTTP/1.1\r\n\r\n", 400),
        (b"GET / HTTP/1.0\r\nHost: localhost\r\n\r\n", 505),
        (b"PUT / HTTP/1.1\r\nHost: localhost\r\n\r\n", 501),
        (b"POST /echo HTTP/1.1\r\nHost: localhost\r\n\r\n", 411),
    ];

    let server = TestServer::spawn(default_config());
    for (request, expected) in tests {
        let mut client = server.connect();
        client.send(request);
        let response = client.response();
        assert_eq!(
            response.status,
            expected,
            "request: {:?}",
            String::from_utf8_lossy(request)
        );
        assert_eq!(response.header("Connection"), Some("close"));
        assert_eq!(response.header("Content-Type"), Some("text/html"));
        client.expect_closed();
    }
}

#[test]
fn invalid_chunk_size() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(
        b"POST /echo HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n4g\r\n",
    );
    let response = client.response();
    assert_eq!(response.status, 400);
    client.expect_closed();
}

#[test]
fn error_drops_pipelined_requests() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(b"GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 400);
    client.expect_closed();
}

#[test]
fn head_too_large() {
    let limits = Limits::default().with_max_header_size(1024);
    let server = TestServer::spawn(default_config().with_limits(limits));
    let mut client = server.connect();
    let mut request = b"GET / HTTP/1.1\r\nHost: localhost\r\n".to_vec();
    while request.len() + 19 <= 1024 {
        request.extend_from_slice(b"X-Filler: aaaaaaa\r\n");
    }
    // Partial header line, without the end of the head.
    request.resize(1024, b'a');
    client.send(&request);
    let response = client.response();
    assert_eq!(response.status, 431);
    client.expect_closed();
}

#[test]
fn client_closes_connection() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Connection"), Some("close"));
    assert_eq!(response.header("Keep-Alive"), None);
    assert_eq!(response.body, b"OK");
    client.expect_closed();
}

#[test]
fn handler_closes_connection() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(b"GET /close HTTP/1.1\r\nHost: localhost\r\n\r\nGET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Connection"), Some("close"));
    assert_eq!(response.body, b"bye");
    client.expect_closed();
}

#[test]
fn max_requests_per_connection() {
    let server = TestServer::spawn(default_config().with_max_requests(2));
    let mut client = server.connect();
    client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.header("Keep-Alive"), Some("timeout=60, max=1"));
    client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.header("Connection"), Some("close"));
    client.expect_closed();
}

#[test]
fn large_response() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(b"GET /large HTTP/1.1\r\nHost: localhost\r\n\r\nGET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    // Give the server time to fill the socket's send buffer.
    sleep(Duration::from_millis(50));
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.body.len(), LARGE_BODY_SIZE);
    assert!(response.body.iter().all(|b| *b == b'a'));
    let response = client.response();
    assert_eq!(response.body, b"OK");
}

#[test]
fn default_error_page() {
    let server = TestServer::spawn(default_config());
    let mut client = server.connect();
    client.send(b"GET /not-found HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 404);
    assert_eq!(response.header("Content-Type"), Some("text/html"));
    let body = str::from_utf8(&response.body).unwrap();
    assert!(body.contains("404 Not Found"), "body: {body}");
    // Error responses from the handler don't close the connection.
    assert_eq!(response.header("Connection"), Some("keep-alive"));
}

#[test]
fn custom_error_page() {
    let path = std::env::temp_dir().join("webserv_functional_custom_error_page.html");
    fs::write(&path, b"<h1>Nothing here</h1>").unwrap();
    let server = ServerConfig::new(any_address()).with_error_page(StatusCode::NOT_FOUND, &path);
    let server = TestServer::spawn(Config::default().with_server(server));
    let mut client = server.connect();
    client.send(b"GET /not-found HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.status, 404);
    assert_eq!(response.body, b"<h1>Nothing here</h1>");
    let _ = fs::remove_file(&path);
}

#[test]
fn virtual_hosts() {
    let address = any_address();
    let config = Config::default()
        .with_server(ServerConfig::new(address).with_server_name("a.example.com"))
        .with_server(ServerConfig::new(address).with_server_name("b.example.com"));
    let server = TestServer::spawn(config);
    let mut client = server.connect();
    let tests: [(&[u8], &[u8]); 4] = [
        (b"a.example.com", b"a.example.com"),
        (b"B.example.com:8080", b"b.example.com"),
        (b"b.example.com", b"b.example.com"),
        (b"c.example.com", b"a.example.com"),
    ];
    for (host, expected) in tests {
        let mut request = b"GET /host HTTP/1.1\r\nHost: ".to_vec();
        request.extend_from_slice(host);
        request.extend_from_slice(b"\r\n\r\n");
        client.send(&request);
        let response = client.response();
        assert_eq!(response.body, expected, "host: {:?}", String::from_utf8_lossy(host));
    }
}

#[test]
fn client_max_body_size() {
    let server = ServerConfig::new(any_address()).with_client_max_body_size(4);
    let server = TestServer::spawn(Config::default().with_server(server));
    let mut client = server.connect();
    client.send(b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 4\r\n\r\nabcd");
    let response = client.response();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, b"abcd");
    client.send(b"POST /echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nabcde");
    let response = client.response();
    assert_eq!(response.status, 413);
    client.expect_closed();
}

#[test]
fn idle_timeout() {
    const IDLE_TIMEOUT: Duration = Duration::from_millis(200);
    let config = default_config()
        .with_idle_timeout(IDLE_TIMEOUT)
        .with_tick(Duration::from_millis(10));
    let server = TestServer::spawn(config);
    let mut client = server.connect();
    client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    let response = client.response();
    assert_eq!(response.header("Keep-Alive"), Some("timeout=1, max=99"));

    let start = Instant::now();
    client.expect_closed();
    assert!(start.elapsed() >= IDLE_TIMEOUT / 2);
}

#[test]
fn max_connections() {
    let server = TestServer::spawn(default_config().with_max_connections(1));
    let mut client = server.connect();
    client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(client.response().status, 200);

    let mut rejected = server.connect();
    rejected.expect_closed();

    // First connection is unaffected.
    client.send(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(client.response().status, 200);
}

#[test]
fn no_servers() {
    let res = Server::new(Config::default(), handler as fn(&Request, &ServerConfig) -> Response);
    assert_eq!(res.unwrap_err().kind(), io::ErrorKind::InvalidInput);
}

/// Server running on another thread, stopped when dropped.
struct TestServer {
    address: SocketAddr,
    shutdown: ShutdownHandle,
    handle: Option<thread::JoinHandle<io::Result<()>>>,
}

impl TestServer {
    fn spawn(config: Config) -> TestServer {
        init_logger();
        let mut server =
            Server::new(config, handler as fn(&Request, &ServerConfig) -> Response).unwrap();
        let address = server.local_addrs().unwrap()[0];
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run());
        TestServer {
            address,
            shutdown,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> Client {
        let stream = net::TcpStream::connect(self.address).unwrap();
        stream.set_nodelay(true).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        stream.set_write_timeout(Some(TIMEOUT)).unwrap();
        Client {
            stream,
            buf: Vec::new(),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown().unwrap();
        if let Some(handle) = self.handle.take() {
            let res = handle.join();
            if !thread::panicking() {
                res.unwrap().unwrap();
            }
        }
    }
}

struct Client {
    stream: net::TcpStream,
    /// Received bytes not yet returned as response.
    buf: Vec<u8>,
}

impl Client {
    fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
    }

    /// Read a single response.
    fn response(&mut self) -> TestResponse {
        loop {
            if let Some(response) = self.parse_response() {
                return response;
            }
            let mut buf = [0; 8192];
            let n = self.stream.read(&mut buf).unwrap();
            assert!(n != 0, "connection closed before the response was complete");
            self.buf.extend_from_slice(&buf[..n]);
        }
    }

    fn parse_response(&mut self) -> Option<TestResponse> {
        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        let head_length = match response.parse(&self.buf).unwrap() {
            httparse::Status::Complete(head_length) => head_length,
            httparse::Status::Partial => return None,
        };
        assert_eq!(response.version, Some(1));
        let status = response.code.unwrap();
        let headers: Vec<(String, String)> = response
            .headers
            .iter()
            .map(|h| {
                let value = str::from_utf8(h.value).unwrap();
                (h.name.to_owned(), value.to_owned())
            })
            .collect();
        let content_length = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .map_or(0, |(_, value)| value.parse().unwrap());
        if self.buf.len() < head_length + content_length {
            return None;
        }
        let body = self.buf[head_length..head_length + content_length].to_vec();
        drop(self.buf.drain(..head_length + content_length));
        Some(TestResponse {
            status,
            headers,
            body,
        })
    }

    /// Expect the server to close the connection.
    fn expect_closed(&mut self) {
        assert!(self.buf.is_empty(), "unexpected bytes: {:?}", self.buf);
        let mut buf = [0; 64];
        match self.stream.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => panic!("unexpected bytes: {:?}", &buf[..n]),
            Err(ref err)
                if err.kind() == io::ErrorKind::ConnectionReset
                    || err.kind() == io::ErrorKind::ConnectionAborted => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
}

struct TestResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
