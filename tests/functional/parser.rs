//! Tests for the [`RequestParser`].

use webserv::parser::ParseState;
use webserv::{HeaderName, Limits, Method, ParseError, RequestParser, StatusCode, Version};

const GET: &[u8] = b"GET /index.html?lang=en HTTP/1.1\r\nHost: example.com\r\nUser-Agent: functional-test\r\n\r\n";
const POST: &[u8] = b"POST /upload HTTP/1.1\r\nHost: example.com\r\nContent-Length: 11\r\n\r\nHello world";
const CHUNKED: &[u8] = b"POST /chunked HTTP/1.1\r\nHost: example.com\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\n\r\n";
const DELETE: &[u8] = b"DELETE /files/a.txt HTTP/1.1\r\nhost: example.com\r\nCookie: sid=123\r\n\r\n";

fn parser() -> RequestParser {
    RequestParser::new(Limits::default())
}

#[test]
fn incremental_equals_whole() {
    let parser = parser();
    let invalid: [&[u8]; 3] = [
        b"GET / HTTP/1.1\r\nHost: a\r\nContent-Length: 1\r\nContent-Length: 1\r\n\r\n",
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n4g\r\nWiki\r\n0\r\n\r\n",
        b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWikiXX0\r\n\r\n",
    ];
    let requests = [GET, POST, CHUNKED, DELETE].into_iter().chain(invalid);
    for request in requests {
        let whole = parser.parse(request);
        assert_ne!(*whole.state(), ParseState::NeedMore);

        // Feeding the bytes one at a time must either need more bytes, or
        // result in the same outcome as parsing the entire request at once.
        let mut buf = Vec::new();
        let mut result = None;
        for byte in request {
            buf.push(*byte);
            let parsed = parser.parse(&buf);
            match parsed.state() {
                ParseState::NeedMore => continue,
                state => {
                    assert_eq!(state, whole.state(), "after {} bytes", buf.len());
                    result = Some(parsed);
                    break;
                }
            }
        }
        let parsed = result.expect("request never completed");
        assert_eq!(parsed.method(), whole.method());
        assert_eq!(parsed.target(), whole.target());
        assert_eq!(parsed.version(), whole.version());
        assert_eq!(parsed.headers().len(), whole.headers().len());
        assert_eq!(parsed.body(), whole.body());
    }
}

#[test]
fn split_at_every_position() {
    let parser = parser();
    for request in [GET, POST, CHUNKED, DELETE] {
        let whole = parser.parse(request);
        for split in 1..request.len() {
            let partial = parser.parse(&request[..split]);
            assert_eq!(*partial.state(), ParseState::NeedMore, "split at {split}");
            assert!(!partial.body_parsed());
        }
        assert_eq!(whole.consumed(), Some(request.len()));
    }
}

#[test]
fn pipelined_requests() {
    let parser = parser();
    let requests = [GET, POST, CHUNKED, DELETE];
    let mut buf: Vec<u8> = requests.concat();
    // Start of the next request.
    buf.extend_from_slice(b"GET / HT");

    let mut consumed_lengths = Vec::new();
    loop {
        let parsed = parser.parse(&buf);
        match parsed.consumed() {
            Some(consumed) => {
                consumed_lengths.push(consumed);
                drop(buf.drain(..consumed));
            }
            None => {
                assert_eq!(*parsed.state(), ParseState::NeedMore);
                break;
            }
        }
    }
    let expected: Vec<usize> = requests.iter().map(|r| r.len()).collect();
    assert_eq!(consumed_lengths, expected);
    assert_eq!(buf, b"GET / HT");
}

#[test]
fn get_request() {
    let parsed = parser().parse(GET);
    assert!(parsed.is_complete());
    assert!(parsed.headers_parsed());
    assert!(parsed.body_parsed());
    let request = parsed.into_request().unwrap();
    assert_eq!(request.method(), Method::Get);
    assert_eq!(request.target(), "/index.html?lang=en");
    assert_eq!(request.path(), "/index.html");
    assert_eq!(request.query(), Some("lang=en"));
    assert_eq!(request.version(), Version::Http11);
    assert_eq!(request.host(), Some("example.com"));
    assert_eq!(
        request.headers().get_bytes(&HeaderName::USER_AGENT),
        Some(&b"functional-test"[..])
    );
    assert!(request.body().is_empty());
    assert!(request.keep_alive());
}

#[test]
fn post_request_with_content_length() {
    let request = parser().parse(POST).into_request().unwrap();
    assert_eq!(request.method(), Method::Post);
    assert_eq!(request.body(), b"Hello world");
}

#[test]
fn chunked_body() {
    let parsed = parser().parse(CHUNKED);
    assert_eq!(parsed.consumed(), Some(CHUNKED.len()));
    assert_eq!(parsed.body(), b"Wikipedia in\r\n\r\nchunks.");
}

#[test]
fn invalid_chunk_size() {
    let input = b"POST / HTTP/1.1\r\nHost: a\r\nTransfer-Encoding: chunked\r\n\r\n4g\r\nWiki\r\n0\r\n\r\n";
    let parsed = parser().parse(input);
    assert_eq!(parsed.error(), Some(ParseError::InvalidChunkSize));
    assert_eq!(ParseError::InvalidChunkSize.proper_status_code(), StatusCode::BAD_REQUEST);
    assert!(parsed.headers_parsed());
    assert!(!parsed.body_parsed());
}

#[test]
fn case_insensitive_header_names() {
    let request = parser().parse(DELETE).into_request().unwrap();
    assert_eq!(request.method(), Method::Delete);
    assert_eq!(request.host(), Some("example.com"));
    assert_eq!(
        request.headers().get_bytes(&HeaderName::COOKIE),
        Some(&b"sid=123"[..])
    );
}

#[test]
fn header_values_are_trimmed() {
    let input = b"GET / HTTP/1.1\r\nHost: \t example.com \t\r\n\r\n";
    let request = parser().parse(input).into_request().unwrap();
    assert_eq!(request.host(), Some("example.com"));
}

#[test]
fn limits() {
    let limits = Limits::default()
        .with_max_header_size(64)
        .with_max_line_length(32)
        .with_max_uri_length(16)
        .with_max_headers(2)
        .with_max_body_size(8);
    let parser = RequestParser::new(limits);

    let tests: [(&[u8], ParseError); 5] = [
        (
            b"GET / HTTP/1.1\r\nHost: a\r\nA: 1\r\nB: 2\r\nC: 3\r\nD: 4\r\nE: 5\r\nF: 6\r\nG: 7\r\nH: 8\r\n",
            ParseError::HeadTooLarge,
        ),
        (
            b"GET / HTTP/1.1\r\nHost: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            ParseError::LineTooLong,
        ),
        (b"GET /aaaaaaaaaaaaaaaaaaaa HTTP/1.1\r\n\r\n", ParseError::UriTooLong),
        (
            b"GET / HTTP/1.1\r\nHost: a\r\nA: 1\r\nB: 2\r\n\r\n",
            ParseError::TooManyHeaders,
        ),
        (
            b"POST / HTTP/1.1\r\nHost: a\r\nContent-Length: 9\r\n\r\n",
            ParseError::PayloadTooLarge,
        ),
    ];
    for (input, expected) in tests {
        let parsed = parser.parse(input);
        assert_eq!(parsed.error(), Some(expected), "input: {:?}", String::from_utf8_lossy(input));
    }
}

#[test]
fn malformed_request_line() {
    let parser = parser();
    let tests: [&[u8]; 3] = [
        b"GET /\r\nHost: a\r\n\r\n",
        b"GET / HTTP/1.1 extra\r\nHost: a\r\n\r\n",
        b"\r\nHost: a\r\n\r\n",
    ];
    for input in tests {
        let parsed = parser.parse(input);
        assert_eq!(parsed.error(), Some(ParseError::InvalidRequestLine));
        assert!(!parsed.headers_parsed());
    }
}
