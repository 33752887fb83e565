//! Error types for the session layer.

use huddle_protocol::{ErrorCode, RoomName, Username};
use huddle_transport::ConnectionId;

use crate::Session;

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The username is empty, blank, or too long.
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    /// Someone already holds a session for this username in this room.
    #[error("user {0} is already a member of room {1}")]
    AlreadyMember(Username, RoomName),

    /// The token was never issued, was invalidated, or its grace period
    /// elapsed.
    #[error("unknown or expired token")]
    UnknownToken,

    /// The token's grace period elapsed before it was used. The session has
    /// been removed; it is returned so its room membership can be cleared.
    #[error("unknown or expired token")]
    Expired(Box<Session>),

    /// The connection is already bound to a session.
    #[error("{0} is already in a room")]
    ConnectionInUse(ConnectionId),
}

impl SessionError {
    /// The wire error code reported to the client for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUsername(_) => ErrorCode::InvalidUsername,
            Self::AlreadyMember(..) => ErrorCode::AlreadyMember,
            Self::UnknownToken | Self::Expired(_) => ErrorCode::UnknownToken,
            Self::ConnectionInUse(_) => ErrorCode::InvalidRequest,
        }
    }
}
