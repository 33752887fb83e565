//! Events: the frames that travel over the chat socket.
//!
//! Every frame is one JSON object with two keys:
//!
//! ```json
//! { "eventType": "join_room", "data": { "roomName": "lobby", "username": "alice" } }
//! ```
//!
//! `#[serde(tag = "eventType", content = "data")]` produces exactly this
//! "adjacently tagged" shape, and `rename_all = "snake_case"` turns the
//! variant `JoinRoom` into `"join_room"`. Field names inside `data` are
//! camelCase because that's what the browser client sends.

use serde::{Deserialize, Serialize};

use crate::{ErrorCode, RoomName, SessionToken, Username};

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// `create_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomData {
    pub room_name: RoomName,
    /// Who asked for the room. When present and not blank, the creator is
    /// joined to the room right away under this name.
    #[serde(default)]
    pub username: Option<Username>,
}

/// `join_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomData {
    pub room_name: RoomName,
    pub username: Username,
}

/// `reconnect_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectRoomData {
    pub token: SessionToken,
}

/// `leave_room` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomData {
    pub room_name: RoomName,
    pub username: Username,
    pub token: SessionToken,
}

/// `send_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageData {
    pub room_name: RoomName,
    pub username: Username,
    pub body: String,
}

/// Everything a client can ask the server to do.
///
/// An unknown `eventType` or a missing field fails to deserialize, which
/// the gateway reports as [`ErrorCode::InvalidRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    CreateRoom(CreateRoomData),
    JoinRoom(JoinRoomData),
    ReconnectRoom(ReconnectRoomData),
    LeaveRoom(LeaveRoomData),
    SendMessage(SendMessageData),
}

impl ClientEvent {
    /// The wire name of this event, for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CreateRoom(_) => "create_room",
            Self::JoinRoom(_) => "join_room",
            Self::ReconnectRoom(_) => "reconnect_room",
            Self::LeaveRoom(_) => "leave_room",
            Self::SendMessage(_) => "send_message",
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A chat message as stored in room history and delivered to members.
///
/// Immutable once the room accepts it. `seq` is assigned by the room and
/// increases by one per accepted message, starting at 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_name: RoomName,
    pub username: Username,
    pub body: String,
    pub seq: u64,
    /// Milliseconds since the Unix epoch, taken when the room accepted it.
    pub timestamp: u64,
}

/// Everything the server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A `create_room` succeeded. `token` is set when the creator was also
    /// joined; a `room_joined` with the same token follows.
    #[serde(rename_all = "camelCase")]
    RoomCreated {
        room_name: RoomName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<SessionToken>,
    },

    /// The connection joined a room; `token` is the reconnect credential.
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_name: RoomName,
        token: SessionToken,
    },

    /// A `reconnect_room` restored the connection's prior membership.
    #[serde(rename_all = "camelCase")]
    RoomReconnected {
        room_name: RoomName,
        token: SessionToken,
        username: Username,
    },

    /// The connection left a room; the token is no longer valid.
    #[serde(rename_all = "camelCase")]
    RoomLeft {
        room_name: RoomName,
        token: SessionToken,
    },

    /// A message was posted to the connection's room.
    MessageReceived(ChatMessage),

    /// A request failed. Never closes the connection.
    Error { code: ErrorCode, message: String },
}

impl ServerEvent {
    /// Builds an `error` event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
