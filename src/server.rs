//! Module with the event loop.
//!
//! The [`Server`] owns all listening sockets and client connections. A single
//! thread runs the loop, each iteration (tick):
//!
//! 1. Polls for readiness events, waiting at most [`Config::tick`].
//! 2. Accepts all pending connections on ready listeners, closing connections
//!    above [`Config::max_connections`] immediately.
//! 3. For ready clients: reads all available bytes, then parses, validates and
//!    dispatches all complete (pipelined) requests in order, queueing the
//!    responses. Pending output is written right away, if the socket can't take
//!    it all the connection is also registered for writable events.
//! 4. Closes connections that hit the idle or write timeout.
//!
//! Nothing in the loop blocks, other than waiting for events.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::mem::take;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, trace, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use socket2::{Domain, Protocol, Socket, Type};

use crate::connection::{Close, Connection};
use crate::header::{Header, HeaderName};
use crate::{
    Config, ErrorPages, Handler, KeepAlive, ParseResult, Request, RequestParser,
    RequestValidator, ServerConfig, StatusCode, REQUEST_TARGET,
};

/// Token used by the [`Waker`] of the [`ShutdownHandle`].
const WAKER: Token = Token(usize::MAX);

/// Backlog of the listening sockets.
const BACKLOG: i32 = 128;

/// Capacity of [`Events`].
const EVENTS_CAPACITY: usize = 128;

/// Single threaded HTTP/1.1 server.
///
/// See the [module documentation] for a description of the event loop.
///
/// [module documentation]: crate::server
pub struct Server<H> {
    poll: Poll,
    events: Events,
    /// Events copied out of `events`, reused between ticks.
    ready: Vec<Ready>,
    /// Listener `n` uses token `n`.
    listeners: Vec<Listener>,
    connections: HashMap<Token, Client>,
    next_token: usize,
    last_sweep: Instant,
    shutdown: Arc<Shutdown>,
    dispatch: Dispatch<H>,
}

/// A listening socket.
#[derive(Debug)]
struct Listener {
    socket: TcpListener,
    address: SocketAddr,
    /// Indices into [`Config::servers`] of the virtual hosts listening on this
    /// address, the first is the default.
    servers: Vec<usize>,
}

/// A client connection.
#[derive(Debug)]
struct Client {
    conn: Connection<TcpStream>,
    peer: SocketAddr,
    /// Index into [`Server::listeners`].
    listener: usize,
    interest: Interest,
}

/// Readiness of a single event.
#[derive(Copy, Clone, Debug)]
struct Ready {
    token: Token,
    readable: bool,
    writable: bool,
    error: bool,
    hangup: bool,
}

impl<H> Server<H>
where
    H: Handler,
{
    /// Create a new server, binding all listeners in `config`.
    ///
    /// Virtual hosts sharing an address share a listener. Error pages are
    /// read here, once.
    pub fn new(config: Config, handler: H) -> io::Result<Server<H>> {
        if config.servers().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "no virtual hosts configured",
            ));
        }

        let poll = Poll::new()?;
        let mut listeners: Vec<Listener> = Vec::new();
        for (idx, server) in config.servers().iter().enumerate() {
            for address in server.listen() {
                if let Some(listener) = listeners.iter_mut().find(|l| l.address == *address) {
                    listener.servers.push(idx);
                    continue;
                }

                let mut socket = bind(*address)?;
                let token = Token(listeners.len());
                poll.registry()
                    .register(&mut socket, token, Interest::READABLE)?;
                info!(address = socket.local_addr()?.to_string().as_str(); "listening");
                listeners.push(Listener {
                    socket,
                    address: *address,
                    servers: vec![idx],
                });
            }
        }

        let waker = Waker::new(poll.registry(), WAKER)?;
        let error_pages = config.servers().iter().map(ErrorPages::load).collect();
        let parser = RequestParser::new(*config.limits());
        let validator = RequestValidator::new(config.limits());
        Ok(Server {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            ready: Vec::with_capacity(EVENTS_CAPACITY),
            next_token: listeners.len(),
            listeners,
            connections: HashMap::new(),
            last_sweep: Instant::now(),
            shutdown: Arc::new(Shutdown {
                stop: AtomicBool::new(false),
                waker,
            }),
            dispatch: Dispatch {
                config,
                parser,
                validator,
                error_pages,
                handler,
            },
        })
    }

    /// Returns the addresses the listeners are bound to.
    ///
    /// Useful if the configuration used port 0.
    pub fn local_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        self.listeners
            .iter()
            .map(|listener| listener.socket.local_addr())
            .collect()
    }

    /// Returns a handle to stop the server from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            inner: self.shutdown.clone(),
        }
    }

    /// Returns the number of open client connections.
    pub fn connections(&self) -> usize {
        self.connections.len()
    }

    /// Run the event loop until [`ShutdownHandle::shutdown`] is called.
    ///
    /// Only returns an error if polling fails, errors on individual
    /// connections only close that connection.
    pub fn run(&mut self) -> io::Result<()> {
        info!("server started");
        while !self.shutdown.stop.load(Ordering::Acquire) {
            self.tick()?;
        }
        info!(connections = self.connections.len(); "server stopped");
        for (_, mut client) in self.connections.drain() {
            let _ = self.poll.registry().deregister(client.conn.stream_mut());
        }
        Ok(())
    }

    /// Run a single iteration of the event loop.
    pub fn tick(&mut self) -> io::Result<()> {
        trace!(connections = self.connections.len(); "polling for events");
        match self.poll.poll(&mut self.events, Some(self.dispatch.config.tick())) {
            Ok(()) => {}
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }

        self.ready.clear();
        self.ready.extend(self.events.iter().map(|event| Ready {
            token: event.token(),
            readable: event.is_readable(),
            writable: event.is_writable(),
            error: event.is_error(),
            hangup: event.is_read_closed() && event.is_write_closed(),
        }));

        let mut ready = take(&mut self.ready);
        for event in ready.drain(..) {
            trace!(token = event.token.0; "handling event");
            if event.token == WAKER {
                // Checked in `run`.
            } else if event.token.0 < self.listeners.len() {
                self.accept(event.token.0);
            } else {
                self.client_event(event);
            }
        }
        self.ready = ready;

        let now = Instant::now();
        if now.saturating_duration_since(self.last_sweep) >= self.dispatch.config.tick() {
            self.sweep_timeouts(now);
            self.last_sweep = now;
        }
        Ok(())
    }

    /// Accept all pending connections on listener `idx`.
    fn accept(&mut self, idx: usize) {
        let config = &self.dispatch.config;
        loop {
            let (mut stream, peer) = match self.listeners[idx].socket.accept() {
                Ok(res) => res,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("error accepting connection: {err}");
                    return;
                }
            };

            if self.connections.len() >= config.max_connections() {
                debug!(peer = peer.to_string().as_str(); "rejecting connection: too many connections");
                drop(stream);
                continue;
            }

            let token = Token(self.next_token);
            self.next_token += 1;
            if let Err(err) = self
                .poll
                .registry()
                .register(&mut stream, token, Interest::READABLE)
            {
                warn!("error registering connection: {err}");
                continue;
            }

            debug!(token = token.0, peer = peer.to_string().as_str(); "accepted connection");
            let conn = Connection::new(stream, config.limits().max_input_size(), Instant::now());
            let client = Client {
                conn,
                peer,
                listener: idx,
                interest: Interest::READABLE,
            };
            let _ = self.connections.insert(token, client);
        }
    }

    /// Handle an event for a client connection.
    fn client_event(&mut self, event: Ready) {
        let Some(client) = self.connections.get_mut(&event.token) else {
            // Closed earlier in this tick.
            return;
        };

        let now = Instant::now();
        let servers = &self.listeners[client.listener].servers;
        let result = if event.error {
            Err(socket_error(client.conn.stream()))
        } else if event.hangup {
            Err(Close::PeerClosed)
        } else {
            handle_io(&mut self.dispatch, client, servers, event, now, event.token)
        };

        let result = result.and_then(|()| {
            update_interest(self.poll.registry(), event.token, client).map_err(Close::Io)
        });
        if let Err(reason) = result {
            self.close(event.token, reason);
        }
    }

    /// Close the connection with `token`.
    fn close(&mut self, token: Token, reason: Close) {
        if let Some(mut client) = self.connections.remove(&token) {
            debug!(
                token = token.0,
                peer = client.peer.to_string().as_str(),
                requests = client.conn.requests();
                "closing connection: {reason}"
            );
            let _ = self.poll.registry().deregister(client.conn.stream_mut());
        }
    }

    /// Close all connections that hit the idle or write timeout.
    fn sweep_timeouts(&mut self, now: Instant) {
        let registry = self.poll.registry();
        let config = &self.dispatch.config;
        let (idle, write) = (config.idle_timeout(), config.write_timeout());
        self.connections.retain(|token, client| {
            match client.conn.check_timeout(now, idle, write) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(token = token.0; "closing connection: {reason}");
                    let _ = registry.deregister(client.conn.stream_mut());
                    false
                }
            }
        });
    }
}

impl<H> std::fmt::Debug for Server<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listeners", &self.listeners)
            .field("connections", &self.connections.len())
            .finish()
    }
}

/// Create a non-blocking listener bound to `address`.
fn bind(address: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
    // Allow restarting the server without waiting for old connections in
    // TIME_WAIT.
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&address.into())?;
    socket.listen(BACKLOG)?;
    Ok(TcpListener::from_std(socket.into()))
}

/// Returns the pending error on `stream`.
fn socket_error(stream: &TcpStream) -> Close {
    match stream.take_error() {
        Ok(Some(err)) | Err(err) => Close::Io(err),
        Ok(None) => Close::Io(io::Error::new(io::ErrorKind::Other, "socket error")),
    }
}

/// Read, process and write for a ready client.
fn handle_io<H: Handler>(
    dispatch: &mut Dispatch<H>,
    client: &mut Client,
    servers: &[usize],
    event: Ready,
    now: Instant,
    token: Token,
) -> Result<(), Close> {
    if event.readable {
        client.conn.on_readable(now)?;
        dispatch.process(&mut client.conn, servers, token)?;
    }
    if event.writable || client.conn.has_pending_output() {
        client.conn.on_writable(now)?;
    }
    Ok(())
}

/// Register for writable events only while there is pending output.
fn update_interest(registry: &Registry, token: Token, client: &mut Client) -> io::Result<()> {
    let interest = if client.conn.has_pending_output() {
        Interest::READABLE | Interest::WRITABLE
    } else {
        Interest::READABLE
    };
    if interest != client.interest {
        registry.reregister(client.conn.stream_mut(), token, interest)?;
        client.interest = interest;
    }
    Ok(())
}

/// Everything needed to turn received bytes into responses.
struct Dispatch<H> {
    config: Config,
    parser: RequestParser,
    validator: RequestValidator,
    /// Indexed like [`Config::servers`].
    error_pages: Vec<ErrorPages>,
    handler: H,
}

impl<H> Dispatch<H>
where
    H: Handler,
{
    /// Process all complete requests in the buffer of `conn`, queueing the
    /// responses.
    ///
    /// `servers` are the virtual hosts of the listener the connection was
    /// accepted on.
    fn process<S>(
        &mut self,
        conn: &mut Connection<S>,
        servers: &[usize],
        token: Token,
    ) -> Result<(), Close>
    where
        S: Read + Write,
    {
        let default_server = servers[0];
        while !conn.is_closing() {
            let parsed = self.parser.parse(conn.buffer());
            let consumed = match self.validator.validate(&parsed) {
                ParseResult::NeedMore => break,
                ParseResult::Complete { consumed } => consumed,
                ParseResult::Error(status) => {
                    debug!(
                        token = token.0,
                        method = parsed.method(),
                        path = parsed.target(),
                        status = status.0;
                        "invalid request: {}",
                        parsed.error().map_or("semantic error", |err| err.as_str())
                    );
                    let response = self.error_pages[default_server].response(status);
                    conn.queue_response(&response, KeepAlive::Close);
                    return conn.close_after_write();
                }
            };
            conn.consume(consumed);

            let Some(request) = parsed.into_request() else {
                // Validated requests always have a known method and version.
                let response = self.error_pages[default_server].response(StatusCode::BAD_REQUEST);
                conn.queue_response(&response, KeepAlive::Close);
                return conn.close_after_write();
            };

            let servers_config = self.config.servers();
            let server_idx = select_server(servers_config, servers, request.host());
            let server = &servers_config[server_idx];
            let count = conn.request_done();

            let mut keep_alive = request.keep_alive() && count < self.config.max_requests();
            let response = if exceeds_body_limit(server, &request) {
                keep_alive = false;
                self.error_pages[server_idx].response(StatusCode::PAYLOAD_TOO_LARGE)
            } else {
                let mut response = self.handler.handle(&request, server);
                if response.wants_close() {
                    keep_alive = false;
                }
                let status = response.status();
                if status.is_error() && response.body().is_empty() {
                    response.set_body(self.error_pages[server_idx].body(status));
                    if !response.headers().contains(&HeaderName::CONTENT_TYPE) {
                        response
                            .headers_mut()
                            .append(Header::new(HeaderName::CONTENT_TYPE, b"text/html"));
                    }
                }
                response
            };

            info!(
                target: REQUEST_TARGET,
                token = token.0,
                method = request.method().as_str(),
                path = request.target(),
                status = response.status().0,
                body_length = response.body().len();
                "handled request"
            );

            if keep_alive {
                let remaining = self.config.max_requests() - count;
                let keep_alive = KeepAlive::Open {
                    timeout: self.config.idle_timeout(),
                    max: remaining,
                };
                conn.queue_response(&response, keep_alive);
            } else {
                conn.queue_response(&response, KeepAlive::Close);
                return conn.close_after_write();
            }
        }
        Ok(())
    }
}

/// Returns `true` if the request body is larger than the virtual host allows.
fn exceeds_body_limit(server: &ServerConfig, request: &Request) -> bool {
    let Some(max) = server.client_max_body_size() else {
        return false;
    };
    let declared: usize = match request.headers().get_value(&HeaderName::CONTENT_LENGTH) {
        Ok(Some(length)) => length,
        Ok(None) | Err(_) => 0,
    };
    request.body().len() > max || declared > max
}

/// Select the virtual host for a request with `host` out of `candidates`,
/// falling back to the first candidate.
fn select_server(servers: &[ServerConfig], candidates: &[usize], host: Option<&str>) -> usize {
    if let Some(host) = host.map(strip_port) {
        for &idx in candidates {
            if servers[idx].matches_name(host) {
                return idx;
            }
        }
    }
    candidates[0]
}

/// Remove the port from the Host header value, keeping the brackets of IPv6
/// addresses.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, _)) => name,
            None => host,
        }
    }
}

/// Handle to stop a running [`Server`].
///
/// Created by [`Server::shutdown_handle`], can be cloned and send to other
/// threads.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    inner: Arc<Shutdown>,
}

#[derive(Debug)]
struct Shutdown {
    stop: AtomicBool,
    waker: Waker,
}

impl ShutdownHandle {
    /// Stop the server.
    ///
    /// The server stops after finishing the current tick, closing all
    /// connections.
    pub fn shutdown(&self) -> io::Result<()> {
        self.inner.stop.store(true, Ordering::Release);
        self.inner.waker.wake()
    }
}
