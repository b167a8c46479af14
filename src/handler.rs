//! Module with the [`Handler`] trait.
//!
//! A [`Handler`] is the seam between the protocol engine and the application:
//! it receives every request that passed validation, together with the
//! virtual host the request was addressed to, and returns the response.
//! Routing, static files, uploads, CGI and the like all live behind this
//! trait.
//!
//! [`WithSessions`] wraps a handler function to give it access to the
//! request's [`Session`].

use std::time::{Duration, SystemTime};

use crate::header::HeaderName;
use crate::session::{set_cookie, Session, Sessions};
use crate::{Request, Response, ServerConfig};

/// Handler is the trait that defines how a single request is handled.
///
/// It's implemented for all functions with the following signature, so a
/// closure can be used as handler.
///
/// ```
/// # use webserv::{Request, Response, ServerConfig, StatusCode};
/// fn not_found(_: &Request, _: &ServerConfig) -> Response {
///     Response::build_new(StatusCode::NOT_FOUND)
/// }
/// #
/// # fn assert_handler<H: webserv::Handler>(_: H) {}
/// # assert_handler(not_found);
/// ```
///
/// Returning an error status code (4xx or 5xx) with an empty body makes the
/// server use the virtual host's error page as body.
pub trait Handler {
    /// Handle a single `request` addressed to `server`.
    fn handle(&mut self, request: &Request, server: &ServerConfig) -> Response;
}

impl<F> Handler for F
where
    F: FnMut(&Request, &ServerConfig) -> Response,
{
    fn handle(&mut self, request: &Request, server: &ServerConfig) -> Response {
        (self)(request, server)
    }
}

/// Interval at which [`WithSessions`] removes expired sessions.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// [`Handler`] that looks up, or creates, the [`Session`] for each request
/// before calling the wrapped function.
///
/// New sessions get a `Set-Cookie` header in the response.
#[derive(Debug)]
pub struct WithSessions<F> {
    handler: F,
    sessions: Sessions,
    last_sweep: SystemTime,
}

impl<F> WithSessions<F>
where
    F: FnMut(&Request, &ServerConfig, &mut Session) -> Response,
{
    /// Wrap `handler`, using `sessions` as store.
    pub fn new(handler: F, sessions: Sessions) -> WithSessions<F> {
        WithSessions {
            handler,
            sessions,
            last_sweep: SystemTime::now(),
        }
    }

    /// Returns the session store.
    pub const fn sessions(&self) -> &Sessions {
        &self.sessions
    }
}

impl<F> Handler for WithSessions<F>
where
    F: FnMut(&Request, &ServerConfig, &mut Session) -> Response,
{
    fn handle(&mut self, request: &Request, server: &ServerConfig) -> Response {
        let now = SystemTime::now();
        if now
            .duration_since(self.last_sweep)
            .map_or(false, |elapsed| elapsed >= SWEEP_INTERVAL)
        {
            self.sessions.sweep(now);
            self.last_sweep = now;
        }

        let (session, created) = self.sessions.touch(request, now);
        let mut response = (self.handler)(request, server, session);
        if created {
            let cookie = set_cookie(session.id());
            response = response.with_header(HeaderName::SET_COOKIE, cookie.as_bytes());
        }
        response
    }
}
