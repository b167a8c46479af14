use webserv::header::{Header, HeaderName, Headers, ParseIntError};

#[test]
fn new_header() {
    let _header = Header::new(HeaderName::USER_AGENT, b"webserv/0.1");
    let _header = Header::new(HeaderName::USER_AGENT, b"");
    // Should be fine.
    let _header = Header::new(HeaderName::USER_AGENT, b"\rabc\n");
}

#[test]
#[should_panic = "header value contains CRLF ('\\r\\n')"]
fn new_header_with_crlf_should_panic() {
    let _header = Header::new(HeaderName::USER_AGENT, b"some_text\r\n");
}

#[test]
fn parse_header_value() {
    let tests: [(&[u8], Result<Option<usize>, ParseIntError>); 3] = [
        (b"100", Ok(Some(100))),
        (b"-1", Err(ParseIntError)),
        (b"99999999999999999999999", Err(ParseIntError)),
    ];
    for (value, expected) in tests {
        let headers: Headers = [Header::new(HeaderName::CONTENT_LENGTH, value)]
            .into_iter()
            .collect();
        assert_eq!(headers.get_value::<usize>(&HeaderName::CONTENT_LENGTH), expected);
    }

    let headers = Headers::EMPTY;
    assert_eq!(headers.get_value::<u64>(&HeaderName::CONTENT_LENGTH), Ok(None));
}

#[test]
fn from_str_known_headers() {
    let known_headers = &[
        "date",
        "host",
        "cookie",
        "server",
        "location",
        "connection",
        "keep-alive",
        "set-cookie",
        "user-agent",
        "content-type",
        "content-length",
        "transfer-encoding",
    ];
    for name in known_headers {
        let header_name = HeaderName::from_str(name);
        assert!(!header_name.is_heap_allocated(), "header: {name}");
        let header_name = HeaderName::from_str(&name.to_ascii_uppercase());
        assert!(!header_name.is_heap_allocated(), "header: {name}");
        assert_eq!(header_name, *name);
    }
}

#[test]
fn from_str_custom() {
    let unknown_headers = &["my-header", "My-Header"];
    for name in unknown_headers {
        let header_name = HeaderName::from_str(name);
        assert!(header_name.is_heap_allocated(), "header: {name}");
        assert_eq!(header_name, "my-header");
        assert_eq!(header_name.as_ref(), "my-header");
    }

    let name = "hast"; // Matches length of "Host" header.
    let header_name = HeaderName::from_str(name);
    assert!(header_name.is_heap_allocated(), "header: {name}");
}

#[test]
#[should_panic = "header name not lowercase"]
fn from_lowercase_not_lowercase_should_panic() {
    let _name = HeaderName::from_lowercase("My-Header");
}

#[test]
fn headers_multiple_values() {
    let mut headers = Headers::EMPTY;
    headers.append(Header::new(HeaderName::COOKIE, b"a=1"));
    headers.append(Header::new(HeaderName::HOST, b"example.com"));
    headers.append(Header::new(HeaderName::COOKIE, b"b=2"));
    assert_eq!(headers.len(), 3);

    let cookies: Vec<&[u8]> = headers.get_all(&HeaderName::COOKIE).collect();
    assert_eq!(cookies, [&b"a=1"[..], &b"b=2"[..]]);
    // `get` returns the first.
    assert_eq!(headers.get(&HeaderName::COOKIE).unwrap().value(), b"a=1");

    headers.remove_all(&HeaderName::COOKIE);
    assert_eq!(headers.len(), 1);
    assert!(!headers.contains(&HeaderName::COOKIE));
    assert_eq!(headers.get_value::<&str>(&HeaderName::HOST), Ok(Some("example.com")));
}

/// Collects the cookie values without keeping the `HeaderName` alive.
fn cookies(headers: &Headers) -> Vec<&[u8]> {
    let values = headers.get_all(&HeaderName::from_str("Cookie"));
    values.collect()
}

#[test]
fn get_all_outlives_name() {
    let mut headers = Headers::EMPTY;
    headers.append(Header::new(HeaderName::COOKIE, b"a=1"));
    headers.append(Header::new(HeaderName::COOKIE, b"b=2"));
    assert_eq!(cookies(&headers), [&b"a=1"[..], &b"b=2"[..]]);
}
