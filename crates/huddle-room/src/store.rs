//! Room store: creates, lists, and routes operations to rooms by name.

use std::collections::{BTreeMap, HashMap};

use huddle_protocol::{ChatMessage, RoomName, ServerEvent, Username};
use huddle_transport::ConnectionId;
use tokio::sync::RwLock;

use crate::room::spawn_room;
use crate::{Delivery, MAX_ROOM_NAME_LEN, MemberLink, RoomConfig, RoomError, RoomHandle, RoomInfo};

/// All rooms on the server, keyed by name.
///
/// The map lock is only held to look up or insert a handle; every room
/// operation then runs against the room's own actor, so rooms never
/// contend with each other. Rooms are kept for the life of the store,
/// even when empty.
pub struct RoomStore {
    rooms: RwLock<HashMap<RoomName, RoomHandle>>,
    config: RoomConfig,
}

impl RoomStore {
    /// Creates an empty store. Every room it spawns uses `config`.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Returns the configuration rooms are created with.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Creates an empty room and starts its actor.
    ///
    /// # Errors
    /// - [`RoomError::InvalidName`]: blank or longer than
    ///   [`MAX_ROOM_NAME_LEN`] characters
    /// - [`RoomError::AlreadyExists`]: the name is taken; the existing room
    ///   is untouched
    pub async fn create_room(
        &self,
        name: RoomName,
        created_by: Option<Username>,
    ) -> Result<RoomHandle, RoomError> {
        validate_name(&name)?;

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&name) {
            return Err(RoomError::AlreadyExists(name));
        }
        let handle = spawn_room(name.clone(), created_by, self.config.clone());
        rooms.insert(name.clone(), handle.clone());
        tracing::info!(room = %name, rooms = rooms.len(), "room created");
        Ok(handle)
    }

    /// Returns `true` if a room with this name exists.
    pub async fn contains(&self, name: &RoomName) -> bool {
        self.rooms.read().await.contains_key(name)
    }

    /// Looks up a room's handle.
    pub async fn get(&self, name: &RoomName) -> Result<RoomHandle, RoomError> {
        self.rooms
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(name.clone()))
    }

    /// Snapshot of every room's metadata, sorted by name.
    ///
    /// Handles are copied out under the read lock and queried after it is
    /// released. A room whose actor fails to answer is skipped.
    pub async fn list_rooms(&self) -> BTreeMap<RoomName, RoomInfo> {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut infos = BTreeMap::new();
        for handle in handles {
            match handle.info().await {
                Ok(info) => {
                    infos.insert(info.name.clone(), info);
                }
                Err(e) => tracing::warn!(room = %handle.name(), error = %e, "room did not report info"),
            }
        }
        infos
    }

    /// Adds `username` to the room, reached through `link`.
    pub async fn join(
        &self,
        name: &RoomName,
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
    ) -> Result<(), RoomError> {
        self.get(name).await?.join(username, link, greeting).await
    }

    /// Points an existing member at a new connection, evicting the old one.
    pub async fn reattach(
        &self,
        name: &RoomName,
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
    ) -> Result<(), RoomError> {
        self.get(name).await?.reattach(username, link, greeting).await
    }

    /// Detaches `username` if its handle still belongs to `conn`.
    pub async fn detach(
        &self,
        name: &RoomName,
        username: Username,
        conn: ConnectionId,
    ) -> Result<bool, RoomError> {
        self.get(name).await?.detach(username, conn).await
    }

    /// Removes `username` from the room. Idempotent.
    pub async fn remove_member(
        &self,
        name: &RoomName,
        username: Username,
    ) -> Result<bool, RoomError> {
        self.get(name).await?.remove(username).await
    }

    /// Removes `username` from the room, failing if it wasn't a member.
    pub async fn leave(&self, name: &RoomName, username: Username) -> Result<(), RoomError> {
        let handle = self.get(name).await?;
        if handle.remove(username.clone()).await? {
            Ok(())
        } else {
            Err(RoomError::NotInRoom(username, name.clone()))
        }
    }

    /// Appends a message to the room and broadcasts it to every attached
    /// member.
    pub async fn append_message(
        &self,
        name: &RoomName,
        username: Username,
        body: String,
    ) -> Result<ChatMessage, RoomError> {
        let (message, _delivery) = self.get(name).await?.post(username, body).await?;
        Ok(message)
    }

    /// Broadcasts a server-originated event to the room.
    pub async fn publish(&self, name: &RoomName, event: ServerEvent) -> Result<Delivery, RoomError> {
        self.get(name).await?.publish(event).await
    }

    /// Metadata for one room.
    pub async fn room_info(&self, name: &RoomName) -> Result<RoomInfo, RoomError> {
        self.get(name).await?.info().await
    }

    /// The room's retained history, oldest first.
    pub async fn history(&self, name: &RoomName) -> Result<Vec<ChatMessage>, RoomError> {
        self.get(name).await?.history().await
    }

    /// Returns the number of rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}

fn validate_name(name: &RoomName) -> Result<(), RoomError> {
    if name.as_str().trim().is_empty() {
        return Err(RoomError::InvalidName("room name must not be empty".into()));
    }
    if name.as_str().chars().count() > MAX_ROOM_NAME_LEN {
        return Err(RoomError::InvalidName(format!(
            "room name must be at most {MAX_ROOM_NAME_LEN} characters"
        )));
    }
    Ok(())
}
