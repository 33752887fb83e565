//! # Huddle
//!
//! A multi-room chat server. Clients talk JSON over a WebSocket at `/ws`;
//! room listing and creation are also available as plain HTTP under
//! `/rooms`, on the same listener.
//!
//! Huddle tracks who is in which room, hands each member a reconnect token,
//! delivers every room's messages in one order to all of its members, and
//! keeps a member's place for a grace period when their socket drops.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use huddle::prelude::*;
//!
//! # async fn start() -> Result<(), HuddleError> {
//! let config = ServerConfig::load()?;
//! let server = HuddleServer::builder().config(config).build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod directory;
mod error;
mod handler;
mod logging;
mod server;

pub use config::{DEFAULT_CONFIG_FILE, ServerConfig};
pub use error::HuddleError;
pub use logging::init_tracing;
pub use server::{HuddleServer, HuddleServerBuilder};

/// Re-exports for the common case: `use huddle::prelude::*;`.
pub mod prelude {
    pub use crate::{HuddleError, HuddleServer, HuddleServerBuilder, ServerConfig};
    pub use huddle_protocol::{ChatMessage, ClientEvent, ErrorCode, RoomName, ServerEvent, SessionToken, Username};
    pub use huddle_room::{RoomConfig, RoomInfo};
    pub use huddle_session::SessionConfig;
}
