//! Wire protocol for Huddle.
//!
//! This crate defines the "language" that chat clients and the server
//! speak:
//!
//! - **Identity types** ([`RoomName`], [`Username`], [`SessionToken`]):
//!   the names that travel inside events.
//! - **Events** ([`ClientEvent`], [`ServerEvent`], [`ChatMessage`]):
//!   `{ "eventType": ..., "data": { ... } }` JSON objects, one per frame.
//! - **Error codes** ([`ErrorCode`]): the taxonomy reported in `error`
//!   events.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events are converted
//!   to/from bytes.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the session
//! and room layers. It doesn't know about connections or rooms: it only
//! knows how to serialize and deserialize events.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientEvent) → Session / Room
//! ```

mod codec;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{
    ChatMessage, ClientEvent, CreateRoomData, JoinRoomData, LeaveRoomData,
    ReconnectRoomData, SendMessageData, ServerEvent,
};
pub use types::{ErrorCode, RoomName, SessionToken, Username};
