//! Room configuration.

use serde::{Deserialize, Serialize};

/// Longest accepted room name, in characters.
pub const MAX_ROOM_NAME_LEN: usize = 64;

/// Configuration shared by every room in a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// How many messages each room keeps. Oldest are dropped first.
    pub history_limit: usize,

    /// Largest accepted message body, in bytes.
    pub max_body_len: usize,

    /// Capacity of each room actor's command channel. Callers wait when it
    /// is full.
    pub command_channel_size: usize,

    /// Whether a reconnecting member gets the retained history queued right
    /// after `room_reconnected`.
    pub replay_on_reconnect: bool,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            max_body_len: 4096,
            command_channel_size: 64,
            replay_on_reconnect: false,
        }
    }
}
