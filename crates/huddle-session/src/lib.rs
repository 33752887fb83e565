//! Session registry for Huddle.
//!
//! This crate answers three questions for the gateway:
//!
//! 1. **Who is this connection?**: a [`ConnectionId`](huddle_transport::ConnectionId)
//!    bound to a session knows its username and room.
//! 2. **Is this token real?**: tokens are minted on join and looked up on
//!    `reconnect_room` and `leave_room`.
//! 3. **Who has been gone too long?**: sessions whose socket closed are
//!    kept for a grace period, then expired.
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)  ← binds connections to sessions, asks rooms to attach members
//!     ↕
//! Session Layer (this crate)  ← token ↔ (username, room) registry
//!     ↕
//! Protocol Layer (below)  ← provides Username, RoomName, SessionToken
//! ```

mod error;
mod registry;
mod session;

pub use error::SessionError;
pub use registry::{Reconnected, SessionRegistry};
pub use session::{Session, SessionConfig, SessionState, MAX_USERNAME_LEN};
