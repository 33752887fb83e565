//! Room lifecycle and message fan-out for Huddle.
//!
//! Each room runs as an isolated Tokio task (actor model) that owns its
//! member list, bounded message history and sequence counter. Every
//! mutation of a room goes through that task, so all members observe one
//! authoritative message order.
//!
//! # Key types
//!
//! - [`RoomStore`]: creates and lists rooms, routes operations by name
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`MemberLink`]: a member's bounded outbox plus its eviction signal
//! - [`Delivery`]: what a broadcast reached and whom it evicted
//! - [`RoomConfig`]: history, body size and channel settings

mod config;
mod error;
mod hub;
mod link;
mod room;
mod store;

pub use config::{RoomConfig, MAX_ROOM_NAME_LEN};
pub use error::RoomError;
pub use hub::Delivery;
pub use link::{DeliveryError, MemberLink};
pub use room::{RoomHandle, RoomInfo};
pub use store::RoomStore;
