use std::io;
use std::time::Duration;

use log::info;
use webserv::handler::WithSessions;
use webserv::session::{Session, Sessions};
use webserv::{Config, HeaderName, Method, Request, Response, Server, ServerConfig, StatusCode};

fn main() -> io::Result<()> {
    // Enable logging.
    std_logger::Config::logfmt().init();

    let address = "127.0.0.1:7890".parse().unwrap();
    let server = ServerConfig::new(address)
        .with_server_name("localhost")
        .with_client_max_body_size(1024);
    let config = Config::default()
        .with_server(server)
        .with_idle_timeout(Duration::from_secs(10));

    let handler = WithSessions::new(hello, Sessions::new());
    let mut server = Server::new(config, handler)?;
    for address in server.local_addrs()? {
        info!("listening on http://{address}");
    }
    server.run()
}

/// Greets the client, counting the number of visits using the session.
fn hello(request: &Request, _: &ServerConfig, session: &mut Session) -> Response {
    match (request.method(), request.path()) {
        (Method::Get, "/") => {
            let body = format!("Hello world, visit number {}\n", session.hits());
            Response::build_new(StatusCode::OK)
                .with_header(HeaderName::CONTENT_TYPE, b"text/plain")
                .with_body(body.into_bytes())
        }
        (Method::Post, "/echo") => Response::build_new(StatusCode::OK)
            .with_header(HeaderName::CONTENT_TYPE, b"application/octet-stream")
            .with_body(request.body().to_vec()),
        (Method::Get | Method::Post, _) => Response::build_new(StatusCode::NOT_FOUND),
        _ => Response::build_new(StatusCode::METHOD_NOT_ALLOWED),
    }
}
