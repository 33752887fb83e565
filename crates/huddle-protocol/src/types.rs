//! Identity types and error codes carried inside events.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The unique name of a room. Rooms are keyed by name, not by a numeric ID.
///
/// A newtype over `String` so a room name can't be passed where a username
/// is expected. `#[serde(transparent)]` keeps it a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(pub String);

impl RoomName {
    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for RoomName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A user's display name. Unique within one room, not across rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(pub String);

impl Username {
    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Username {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for Username {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// An opaque reconnection credential minted by the server.
///
/// The client keeps it (the browser client uses local storage) and presents
/// it in `reconnect_room` and `leave_room`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Only a short prefix is shown so tokens don't end up in logs.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "SessionToken({prefix}…)")
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self(token.to_owned())
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// The error taxonomy reported to clients in `error` events.
///
/// Serialized as the bare variant name (`"RoomNotFound"`), which is what
/// the client displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Unparsable frame, unknown `eventType`, missing or invalid field.
    InvalidRequest,
    /// No room with the given name.
    RoomNotFound,
    /// A room with the given name already exists.
    RoomAlreadyExists,
    /// The token was never issued, was invalidated, or expired.
    UnknownToken,
    /// The username is already a member of the room.
    AlreadyMember,
    /// The user is not a member of the room named in the request.
    NotInRoom,
    /// The username is empty or otherwise unacceptable.
    InvalidUsername,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidRequest => "InvalidRequest",
            Self::RoomNotFound => "RoomNotFound",
            Self::RoomAlreadyExists => "RoomAlreadyExists",
            Self::UnknownToken => "UnknownToken",
            Self::AlreadyMember => "AlreadyMember",
            Self::NotInRoom => "NotInRoom",
            Self::InvalidUsername => "InvalidUsername",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomName::from("lobby")).unwrap();
        assert_eq!(json, "\"lobby\"");
    }

    #[test]
    fn test_username_display_is_raw_name() {
        assert_eq!(Username::from("alice").to_string(), "alice");
    }

    #[test]
    fn test_session_token_debug_hides_most_of_the_secret() {
        let token = SessionToken::from("0123456789abcdef0123456789abcdef");
        let shown = format!("{token:?}");
        assert!(shown.contains("012345"));
        assert!(!shown.contains("0123456789abcdef0123456789abcdef"));
    }

    #[test]
    fn test_error_code_serializes_as_variant_name() {
        let json = serde_json::to_string(&ErrorCode::RoomAlreadyExists).unwrap();
        assert_eq!(json, "\"RoomAlreadyExists\"");
    }

    #[test]
    fn test_error_code_display_matches_wire_name() {
        for code in [
            ErrorCode::InvalidRequest,
            ErrorCode::RoomNotFound,
            ErrorCode::UnknownToken,
            ErrorCode::NotInRoom,
        ] {
            let wire = serde_json::to_string(&code).unwrap();
            assert_eq!(wire, format!("\"{code}\""));
        }
    }
}
