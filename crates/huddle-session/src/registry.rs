//! The session registry: tracks every reconnect token the server has issued.
//!
//! It's responsible for:
//! - Minting a token when a user joins a room
//! - Binding the token to whichever connection currently speaks for it
//! - Validating tokens on reconnect and leave
//! - Expiring sessions whose socket has been gone for longer than the grace
//!   period
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself: it uses plain
//! `HashMap`s. The server wraps it in one `tokio::sync::Mutex` and holds the
//! lock for map operations and the room updates that must agree with them,
//! never across socket I/O.

use std::collections::HashMap;

use huddle_protocol::{RoomName, SessionToken, Username};
use huddle_transport::ConnectionId;
use rand::Rng;

use crate::{MAX_USERNAME_LEN, Session, SessionConfig, SessionError, SessionState};

/// Outcome of a successful [`SessionRegistry::reconnect`].
#[derive(Debug, Clone)]
pub struct Reconnected {
    /// The session, now bound to the reconnecting connection.
    pub session: Session,
    /// The connection that spoke for the session before, if it was still
    /// considered live. That socket has been superseded.
    pub superseded: Option<ConnectionId>,
}

/// Registry of all sessions, keyed by token.
///
/// ## Lifecycle
///
/// ```text
/// create_session() ──→ disconnect() ──→ reconnect() ──→ invalidate()
///        │                   │                              ▲
///        ▼                   ▼                              │
///   [Connected]        [Disconnected] ── expire_stale() ────┘ (removed)
/// ```
///
/// Three indexes are kept in sync:
/// - `sessions`: token → session (the source of truth)
/// - `connections`: live connection → token
/// - `members`: (room, username) → token, which enforces "one session per
///   username per room"
pub struct SessionRegistry {
    sessions: HashMap<SessionToken, Session>,
    connections: HashMap<ConnectionId, SessionToken>,
    members: HashMap<(RoomName, Username), SessionToken>,
    config: SessionConfig,
}

impl SessionRegistry {
    /// Creates a new, empty registry with the given config.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            connections: HashMap::new(),
            members: HashMap::new(),
            config,
        }
    }

    /// Returns the registry's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mints a session binding `username` in `room` to the live `conn`.
    ///
    /// # Errors
    /// - [`SessionError::InvalidUsername`]: blank or longer than
    ///   [`MAX_USERNAME_LEN`] characters
    /// - [`SessionError::AlreadyMember`]: the username already holds a
    ///   session in this room
    /// - [`SessionError::ConnectionInUse`]: `conn` is already bound
    pub fn create_session(
        &mut self,
        username: Username,
        room: RoomName,
        conn: ConnectionId,
    ) -> Result<&Session, SessionError> {
        validate_username(&username)?;

        let key = (room, username);
        if self.members.contains_key(&key) {
            let (room, username) = key;
            return Err(SessionError::AlreadyMember(username, room));
        }
        if self.connections.contains_key(&conn) {
            return Err(SessionError::ConnectionInUse(conn));
        }

        let token = self.mint_token();
        let (room, username) = key;

        tracing::info!(%conn, room = %room, %username, "session created");

        self.members
            .insert((room.clone(), username.clone()), token.clone());
        self.connections.insert(conn, token.clone());
        let session = self.sessions.entry(token.clone()).or_insert(Session {
            token,
            username,
            room,
            state: SessionState::Connected { conn },
        });
        Ok(session)
    }

    /// Re-binds the session behind `token` to `conn`.
    ///
    /// Works both for a disconnected session within its grace period and for
    /// one still bound to an older socket; in the latter case the old
    /// connection is reported in [`Reconnected::superseded`] and no longer
    /// speaks for the session.
    ///
    /// # Errors
    /// - [`SessionError::UnknownToken`]: never issued or already invalidated
    /// - [`SessionError::Expired`]: the grace period elapsed; the stale
    ///   session is removed and handed back
    /// - [`SessionError::ConnectionInUse`]: `conn` already speaks for a
    ///   different session
    pub fn reconnect(
        &mut self,
        token: &SessionToken,
        conn: ConnectionId,
    ) -> Result<Reconnected, SessionError> {
        let grace = self.config.grace();
        let stale = self
            .sessions
            .get(token)
            .ok_or(SessionError::UnknownToken)?
            .is_stale(grace);
        if stale {
            return Err(match self.invalidate(token) {
                Some(session) => SessionError::Expired(Box::new(session)),
                None => SessionError::UnknownToken,
            });
        }

        if let Some(bound) = self.connections.get(&conn) {
            if bound != token {
                return Err(SessionError::ConnectionInUse(conn));
            }
        }

        let session = self
            .sessions
            .get_mut(token)
            .ok_or(SessionError::UnknownToken)?;

        let superseded = match session.state {
            SessionState::Connected { conn: old } if old != conn => Some(old),
            _ => None,
        };
        session.state = SessionState::Connected { conn };
        let session = session.clone();

        if let Some(old) = superseded {
            self.connections.remove(&old);
        }
        self.connections.insert(conn, token.clone());

        tracing::info!(
            %conn,
            room = %session.room,
            username = %session.username,
            superseded = superseded.is_some(),
            "session reconnected"
        );

        Ok(Reconnected {
            session,
            superseded,
        })
    }

    /// Marks the session bound to `conn` as disconnected and starts its
    /// grace period.
    ///
    /// Returns the session as it is now, or `None` if `conn` doesn't speak
    /// for any session (never joined, already left, or superseded by a
    /// reconnect elsewhere).
    pub fn disconnect(&mut self, conn: ConnectionId) -> Option<Session> {
        let token = self.connections.remove(&conn)?;
        let session = self.sessions.get_mut(&token)?;
        session.state = SessionState::Disconnected {
            since: std::time::Instant::now(),
        };
        tracing::info!(
            %conn,
            room = %session.room,
            username = %session.username,
            "session disconnected, grace period started"
        );
        Some(session.clone())
    }

    /// Removes the session behind `token`. Idempotent.
    ///
    /// Returns the removed session, if there was one.
    pub fn invalidate(&mut self, token: &SessionToken) -> Option<Session> {
        let session = self.sessions.remove(token)?;
        self.members
            .remove(&(session.room.clone(), session.username.clone()));
        if let Some(conn) = session.connection() {
            self.connections.remove(&conn);
        }
        tracing::info!(
            room = %session.room,
            username = %session.username,
            "session invalidated"
        );
        Some(session)
    }

    /// Removes every disconnected session whose grace period elapsed.
    ///
    /// Returns the removed sessions so the caller can take their members out
    /// of their rooms.
    pub fn expire_stale(&mut self) -> Vec<Session> {
        let grace = self.config.grace();
        let stale: Vec<SessionToken> = self
            .sessions
            .values()
            .filter(|s| s.is_stale(grace))
            .map(|s| s.token.clone())
            .collect();

        let expired: Vec<Session> =
            stale.iter().filter_map(|t| self.invalidate(t)).collect();
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired stale sessions");
        }
        expired
    }

    /// Looks up a session by token.
    pub fn get(&self, token: &SessionToken) -> Option<&Session> {
        self.sessions.get(token)
    }

    /// Looks up the session a live connection speaks for.
    pub fn session_for(&self, conn: ConnectionId) -> Option<&Session> {
        self.connections
            .get(&conn)
            .and_then(|token| self.sessions.get(token))
    }

    /// Returns the number of sessions (connected or within grace).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn mint_token(&self) -> SessionToken {
        loop {
            let token = generate_token();
            if !self.sessions.contains_key(&token) {
                return token;
            }
        }
    }
}

fn validate_username(username: &Username) -> Result<(), SessionError> {
    let name = username.as_str();
    if name.trim().is_empty() {
        return Err(SessionError::InvalidUsername(
            "username must not be empty".into(),
        ));
    }
    if name.chars().count() > MAX_USERNAME_LEN {
        return Err(SessionError::InvalidUsername(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// `ThreadRng` is a CSPRNG, so tokens can't be predicted from earlier ones.
fn generate_token() -> SessionToken {
    let bytes: [u8; 16] = rand::rng().random();
    SessionToken(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

// =========================================================================
// Tests
// =========================================================================
