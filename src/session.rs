//! Module with a cookie based session store.
//!
//! Sessions are identified by an opaque id stored in the `sid` cookie. The
//! store lives in the event loop's thread, it isn't tied to a connection, so a
//! client keeps its session across connections.
//!
//! Use [`WithSessions`] to give a handler access to the session of the
//! request.
//!
//! [`WithSessions`]: crate::handler::WithSessions

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::debug;

use crate::header::HeaderName;
use crate::{trim_ws, Request};

/// Name of the session cookie.
pub const COOKIE_NAME: &str = "sid";

/// A single session.
#[derive(Clone, Debug)]
pub struct Session {
    id: String,
    hits: u64,
    created: SystemTime,
    last_seen: SystemTime,
}

impl Session {
    /// Returns the session id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the number of requests made using this session.
    pub const fn hits(&self) -> u64 {
        self.hits
    }

    /// Returns the time the session was created.
    pub const fn created(&self) -> SystemTime {
        self.created
    }

    /// Returns the time of the last request using this session.
    pub const fn last_seen(&self) -> SystemTime {
        self.last_seen
    }
}

/// Session store.
#[derive(Debug)]
pub struct Sessions {
    sessions: HashMap<String, Session>,
    /// Sequence number used in new ids.
    next_seq: u64,
    max_idle: Duration,
}

impl Sessions {
    /// Default time after which an unused session is removed.
    pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(5 * 60);

    /// Create an empty store.
    pub fn new() -> Sessions {
        Sessions {
            sessions: HashMap::new(),
            next_seq: 0,
            max_idle: Sessions::DEFAULT_MAX_IDLE,
        }
    }

    /// Set the time after which an unused session is removed by
    /// [`Sessions::sweep`].
    pub fn with_max_idle(mut self, max_idle: Duration) -> Sessions {
        self.max_idle = max_idle;
        self
    }

    /// Returns the session for `request`, creating one if the request doesn't
    /// have a session cookie or the session is unknown (e.g. expired).
    ///
    /// The boolean is `true` if the session was created, in which case the
    /// response should set the cookie, see [`set_cookie`].
    pub fn touch(&mut self, request: &Request, now: SystemTime) -> (&mut Session, bool) {
        let known = session_id(request).filter(|id| self.sessions.contains_key(*id));
        let (id, created) = match known {
            Some(id) => (id.to_owned(), false),
            None => (self.new_id(now), true),
        };

        let session = self.sessions.entry(id).or_insert_with_key(|id| {
            debug!(session_id = id.as_str(); "creating new session");
            Session {
                id: id.clone(),
                hits: 0,
                created: now,
                last_seen: now,
            }
        });
        session.hits += 1;
        session.last_seen = now;
        (session, created)
    }

    /// Returns the session with `id`, if any.
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Returns the number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove all sessions not used for longer than the maximum idle time.
    pub fn sweep(&mut self, now: SystemTime) {
        let max_idle = self.max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match now.duration_since(session.last_seen) {
            Ok(idle) => idle <= max_idle,
            // Clock went backwards.
            Err(_) => true,
        });
        let removed = before - self.sessions.len();
        if removed != 0 {
            debug!(removed = removed; "removed expired sessions");
        }
    }

    /// Create a new id: `<unix seconds>-<sequence>`.
    fn new_id(&mut self, now: SystemTime) -> String {
        let secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut itoa_buf = itoa::Buffer::new();
        let mut id = String::with_capacity(32);
        id.push_str(itoa_buf.format(secs));
        id.push('-');
        id.push_str(itoa_buf.format(seq));
        id
    }
}

impl Default for Sessions {
    fn default() -> Sessions {
        Sessions::new()
    }
}

/// Returns the session id from the Cookie header(s) of `request`, if any.
pub fn session_id(request: &Request) -> Option<&str> {
    request
        .headers()
        .get_all(&HeaderName::COOKIE)
        .flat_map(|value| value.split(|b| *b == b';'))
        .find_map(|pair| {
            let pair = trim_ws(pair);
            let value = pair.strip_prefix(COOKIE_NAME.as_bytes())?.strip_prefix(b"=")?;
            if value.is_empty() {
                None
            } else {
                std::str::from_utf8(value).ok()
            }
        })
}

/// Returns the value of the Set-Cookie header for session `id`.
pub fn set_cookie(id: &str) -> String {
    format!("{COOKIE_NAME}={id}; Path=/; HttpOnly")
}
