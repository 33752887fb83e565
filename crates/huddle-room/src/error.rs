//! Error types for the room layer.

use huddle_protocol::{ErrorCode, RoomName, Username};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomName),

    /// A room with this name already exists.
    #[error("room {0} already exists")]
    AlreadyExists(RoomName),

    /// The username is already a member of this room.
    #[error("user {0} is already a member of room {1}")]
    AlreadyMember(Username, RoomName),

    /// The username is not a member of this room.
    #[error("user {0} is not in room {1}")]
    NotInRoom(Username, RoomName),

    /// The room name is empty or too long.
    #[error("invalid room name: {0}")]
    InvalidName(String),

    /// The message body is empty or too long.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The room's actor is gone.
    #[error("room {0} is unavailable")]
    Unavailable(RoomName),
}

impl RoomError {
    /// The wire error code reported to the client for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) | Self::Unavailable(_) => ErrorCode::RoomNotFound,
            Self::AlreadyExists(_) => ErrorCode::RoomAlreadyExists,
            Self::AlreadyMember(..) => ErrorCode::AlreadyMember,
            Self::NotInRoom(..) => ErrorCode::NotInRoom,
            Self::InvalidName(_) | Self::InvalidMessage(_) => {
                ErrorCode::InvalidRequest
            }
        }
    }
}
