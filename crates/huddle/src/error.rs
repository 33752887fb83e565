//! Unified error type for the Huddle server.

use huddle_protocol::{ErrorCode, ProtocolError};
use huddle_room::RoomError;
use huddle_session::SessionError;
use huddle_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum HuddleError {
    /// A transport-level error (bind, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (username, token).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, membership, message).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The request is well-formed but not allowed in the connection's
    /// current state.
    #[error("{0}")]
    InvalidRequest(String),

    /// Loading configuration failed.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// The HTTP listener stopped with an I/O error.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

impl HuddleError {
    /// The wire error code reported to the client for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Protocol(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Room(e) => e.code(),
            Self::Transport(_) | Self::InvalidRequest(_) | Self::Config(_) | Self::Io(_) => {
                ErrorCode::InvalidRequest
            }
        }
    }
}

impl From<figment::Error> for HuddleError {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}
