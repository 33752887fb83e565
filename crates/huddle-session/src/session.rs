//! Session types: the server's record of "who is sitting in which room".
//!
//! A session tracks:
//! - WHO the user is (`Username`) and WHERE (`RoomName`)
//! - HOW they get back in (the secret `SessionToken`)
//! - WHICH socket currently speaks for them, or WHEN that socket went away

use std::time::{Duration, Instant};

use huddle_protocol::{RoomName, SessionToken, Username};
use huddle_transport::ConnectionId;
use serde::{Deserialize, Serialize};

/// Longest accepted username, in characters.
pub const MAX_USERNAME_LEN: usize = 32;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long (in seconds) a user whose socket closed may reconnect with
    /// their token before the session is expired and they leave the room.
    ///
    /// Default: 30 seconds. Set to 0 to remove members as soon as their
    /// socket closes.
    pub reconnect_grace_secs: u64,
}

impl SessionConfig {
    /// The grace period as a `Duration`.
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.reconnect_grace_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Whether a live socket currently speaks for the session.
///
/// ```text
///   Connected ──(socket closed)──→ Disconnected ──(grace elapsed)──→ removed
///       ↑                              │
///       └──────(reconnect_room)────────┘
/// ```
///
/// A reconnect may also arrive while the session is still `Connected` to an
/// older socket (the browser reloaded before the server noticed). The new
/// connection takes over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Bound to a live connection.
    Connected { conn: ConnectionId },

    /// The socket closed at `since`; the token still works until the grace
    /// period runs out.
    Disconnected { since: Instant },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One user's membership credential.
#[derive(Debug, Clone)]
pub struct Session {
    /// The reconnect token, 32 lowercase hex chars (128 bits).
    pub token: SessionToken,
    pub username: Username,
    pub room: RoomName,
    pub state: SessionState,
}

impl Session {
    /// The live connection bound to this session, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self.state {
            SessionState::Connected { conn } => Some(conn),
            SessionState::Disconnected { .. } => None,
        }
    }

    /// Returns `true` if the session is disconnected and older than `grace`.
    pub fn is_stale(&self, grace: Duration) -> bool {
        matches!(
            self.state,
            SessionState::Disconnected { since } if since.elapsed() > grace
        )
    }
}
