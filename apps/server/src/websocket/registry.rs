//! Session registry
//!
//! Process-wide table mapping short session codes to live sessions. Owns
//! code generation, membership changes, and time-based reclamation. The
//! registry is an explicitly owned service object: it is cloned into every
//! handler and never exposed as a global.

use dashmap::DashMap;
use rand::Rng;
use std::sync::Arc;

use super::connection::ConnectionId;
use super::messages::{PlaybackState, TrackInfo};
use super::session::Session;

/// Code alphabet excluding visually ambiguous characters (I, L, O, 0, 1)
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of generated session codes
pub const CODE_LEN: usize = 6;

/// Bounded retry count for code generation
const MAX_CODE_ATTEMPTS: usize = 32;

/// Errors surfaced by registry operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no live session matches the code")]
    NotFound,

    #[error("listener capacity reached")]
    Capacity,

    #[error("code generation retries exhausted")]
    Collision,
}

/// Result of a successful create
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub code: String,
    pub name: String,
    pub host_token: String,
}

/// Result of a successful join: the full current snapshot plus routing info
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub code: String,
    pub name: String,
    pub host_conn: ConnectionId,
    pub track: Option<TrackInfo>,
    pub state: PlaybackState,
    pub listener_count: usize,
    /// All members after the join, for the listener-count broadcast
    pub members: Vec<ConnectionId>,
}

/// What a departing connection was to its session
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// The host left: the session was destroyed and every listed listener
    /// must receive a host-departed notification
    HostLeft {
        code: String,
        listeners: Vec<ConnectionId>,
    },

    /// A listener left: the session stays live
    ListenerLeft {
        code: String,
        host_conn: ConnectionId,
        listener_count: usize,
        /// Remaining members, for the listener-count broadcast
        members: Vec<ConnectionId>,
    },
}

/// Process-wide session table
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Create a new session hosted by `host_conn`
    ///
    /// Generates a random fixed-length code, retrying up to a bounded
    /// attempt count on collision with a live code.
    pub fn create(
        &self,
        name: &str,
        host_conn: ConnectionId,
    ) -> Result<CreatedSession, RegistryError> {
        self.create_with(name, host_conn, generate_code)
    }

    /// Create with an explicit code generator, driving the bounded retry loop
    fn create_with(
        &self,
        name: &str,
        host_conn: ConnectionId,
        mut next_code: impl FnMut() -> String,
    ) -> Result<CreatedSession, RegistryError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = next_code();

            match self.sessions.entry(code.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    let session = Session::new(code.clone(), host_conn, name);
                    let created = CreatedSession {
                        code,
                        name: session.display_name.clone(),
                        host_token: session.host_token.clone(),
                    };
                    entry.insert(session);

                    tracing::info!(
                        code = %created.code,
                        name = %created.name,
                        host = %host_conn,
                        "Session created"
                    );
                    return Ok(created);
                }
            }
        }

        tracing::error!(
            attempts = MAX_CODE_ATTEMPTS,
            "Session code generation exhausted"
        );
        Err(RegistryError::Collision)
    }

    /// Add `conn` as a listener of the session identified by `code`
    pub fn join(
        &self,
        code: &str,
        conn: ConnectionId,
        max_listeners: usize,
    ) -> Result<JoinedSession, RegistryError> {
        let mut session = self.sessions.get_mut(code).ok_or(RegistryError::NotFound)?;

        if session.listener_count() >= max_listeners {
            return Err(RegistryError::Capacity);
        }

        session.add_listener(conn);

        Ok(JoinedSession {
            code: session.code.clone(),
            name: session.display_name.clone(),
            host_conn: session.host_conn,
            track: session.track.clone(),
            state: session.state.clone(),
            listener_count: session.listener_count(),
            members: session.members().collect(),
        })
    }

    /// Handle a departing connection, whichever session it belonged to
    ///
    /// Host departure destroys the session; listener departure only updates
    /// membership. Returns None for connections in no session.
    pub fn leave(&self, conn: ConnectionId) -> Option<LeaveOutcome> {
        // Scan pass: find the session this connection belongs to
        let (code, is_host) = self.sessions.iter().find_map(|entry| {
            if entry.host_conn == conn {
                Some((entry.code.clone(), true))
            } else if entry.listeners.contains(&conn) {
                Some((entry.code.clone(), false))
            } else {
                None
            }
        })?;

        if is_host {
            let (_, session) = self.sessions.remove(&code)?;
            tracing::info!(
                code = %code,
                listeners = session.listener_count(),
                "Host departed, session destroyed"
            );
            Some(LeaveOutcome::HostLeft {
                code,
                listeners: session.listeners.into_iter().collect(),
            })
        } else {
            let mut session = self.sessions.get_mut(&code)?;
            session.remove_listener(conn);
            Some(LeaveOutcome::ListenerLeft {
                code: session.code.clone(),
                host_conn: session.host_conn,
                listener_count: session.listener_count(),
                members: session.members().collect(),
            })
        }
    }

    /// Remove a session outright
    pub fn remove(&self, code: &str) -> Option<Session> {
        self.sessions.remove(code).map(|(_, session)| session)
    }

    /// Run `f` against the session identified by `code`, if live
    pub fn with_session_mut<R>(&self, code: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        self.sessions.get_mut(code).map(|mut entry| f(&mut entry))
    }

    /// Remove every session whose last activity predates `now - ttl_ms`
    ///
    /// Runs on a fixed interval independent of request traffic; sessions
    /// touched by any mutation within the window survive.
    pub fn sweep(&self, ttl_ms: i64) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let before = self.sessions.len();

        self.sessions.retain(|code, session| {
            let keep = !session.is_idle(now, ttl_ms);
            if !keep {
                tracing::info!(
                    code = %code,
                    idle_ms = now - session.last_active_at,
                    "Idle session reclaimed"
                );
            }
            keep
        });

        before - self.sessions.len()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Total listeners across all live sessions
    pub fn listener_count(&self) -> usize {
        self.sessions.iter().map(|s| s.listener_count()).sum()
    }
}

/// Generate a random code from the unambiguous alphabet
fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
