//! Per-connection handler: decodes events and drives one connection through
//! its states.
//!
//! Each upgraded socket gets its own Tokio task running this handler, plus a
//! writer task that drains the connection's outbox into the socket. The flow
//! is:
//!   1. Create the outbox and start the writer
//!   2. Loop: receive a frame → decode → dispatch → queue the reply
//!   3. On close, eviction or idle timeout: release the room membership
//!
//! A socket that closes keeps its member for the reconnect grace period. A
//! connection the room evicted (its outbox refused an event, or a write
//! failed) has left for good.
//!
//! ```text
//!   Connected ──(join_room / reconnect_room / create_room as creator)──→ InRoom
//!       ↑                                          │
//!       └──────────────(leave_room)────────────────┘
//!   any state ──(socket closed, evicted, idle)──→ Closed
//! ```
//!
//! Request errors never end the connection; they come back as `error`
//! events.

use std::sync::Arc;
use std::time::Duration;

use huddle_protocol::{
    ClientEvent, Codec, CreateRoomData, JoinRoomData, LeaveRoomData, ReconnectRoomData, RoomName,
    SendMessageData, ServerEvent, SessionToken, Username,
};
use huddle_room::{MemberLink, RoomError, RoomHandle};
use huddle_session::SessionError;
use huddle_transport::{Connection, ConnectionId, TransportError, WebSocketConnection};
use tokio::sync::mpsc;

use crate::HuddleError;
use crate::server::{ServerState, remove_expired};

/// Where a connection stands.
#[derive(Debug, Clone)]
enum Status {
    /// Open, not in any room.
    Connected,

    /// Joined (or reconnected to) `room` as `username`, holding `token`.
    InRoom {
        username: Username,
        room: RoomName,
        token: SessionToken,
    },
}

/// Why the read loop stopped.
enum Frame {
    Data(Vec<u8>),
    Closed,
    Failed(TransportError),
    Idle,
    Evicted,
}

/// One connection's view of the server.
struct Gateway {
    conn_id: ConnectionId,
    link: MemberLink,
    state: Arc<ServerState>,
    status: Status,
}

/// Handles a single connection from upgrade to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), HuddleError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let (link, outbox) = MemberLink::channel(conn_id, state.config.outbox_capacity);
    let writer = tokio::spawn(write_outbox(
        Arc::clone(&conn),
        outbox,
        link.clone(),
        state.codec,
    ));

    let idle = state.config.idle_timeout();
    let mut gateway = Gateway {
        conn_id,
        link,
        state,
        status: Status::Connected,
    };

    let ended = loop {
        let frame = tokio::select! {
            frame = next_frame(&conn, idle) => frame,
            () = gateway.link.evicted() => Frame::Evicted,
        };
        match frame {
            Frame::Data(data) => gateway.handle_frame(&data).await,
            other => break other,
        }
    };

    let evicted = matches!(ended, Frame::Evicted);
    let result = match ended {
        Frame::Closed => {
            tracing::info!(%conn_id, "connection closed cleanly");
            Ok(())
        }
        Frame::Idle => {
            tracing::info!(%conn_id, "connection timed out");
            Ok(())
        }
        Frame::Evicted => {
            tracing::info!(%conn_id, "connection evicted");
            Ok(())
        }
        Frame::Failed(e) => Err(HuddleError::Transport(e)),
        Frame::Data(_) => Ok(()),
    };

    gateway.release(evicted).await;
    writer.abort();
    let _ = conn.close().await;
    result
}

/// Waits for the next frame, giving up after `idle` of silence.
async fn next_frame(conn: &WebSocketConnection, idle: Option<Duration>) -> Frame {
    let received = match idle {
        Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
            Ok(received) => received,
            Err(_) => return Frame::Idle,
        },
        None => conn.recv().await,
    };
    match received {
        Ok(Some(data)) => Frame::Data(data),
        Ok(None) => Frame::Closed,
        Err(e) => Frame::Failed(e),
    }
}

/// Drains the outbox into the socket until either side goes away.
///
/// A failed write evicts the connection so the read loop stops too.
async fn write_outbox(
    conn: Arc<WebSocketConnection>,
    mut outbox: mpsc::Receiver<ServerEvent>,
    link: MemberLink,
    codec: impl Codec,
) {
    while let Some(event) = outbox.recv().await {
        let bytes = match codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(conn_id = %link.conn(), error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %link.conn(), error = %e, "write failed");
            link.evict();
            break;
        }
    }
}

impl Gateway {
    /// Decodes one frame and runs it, answering errors with an `error`
    /// event.
    async fn handle_frame(&mut self, data: &[u8]) {
        let event: ClientEvent = match self.state.codec.decode(data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(conn_id = %self.conn_id, error = %e, "failed to decode event");
                self.reply(ServerEvent::error(e.code(), e.to_string()));
                return;
            }
        };

        let event_type = event.event_type();
        if let Err(e) = self.dispatch(event).await {
            tracing::debug!(
                conn_id = %self.conn_id,
                event_type,
                error = %e,
                "request rejected"
            );
            self.reply(ServerEvent::error(e.code(), e.to_string()));
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<(), HuddleError> {
        match event {
            ClientEvent::CreateRoom(data) => self.create_room(data).await,
            ClientEvent::JoinRoom(data) => self.join_room(data).await,
            ClientEvent::ReconnectRoom(data) => self.reconnect_room(data).await,
            ClientEvent::LeaveRoom(data) => self.leave_room(data).await,
            ClientEvent::SendMessage(data) => self.send_message(data).await,
        }
    }

    /// Queues an event for this connection. A full outbox means the client
    /// stopped reading, so the connection is dropped.
    fn reply(&self, event: ServerEvent) {
        if let Err(e) = self.link.try_deliver(event) {
            tracing::warn!(conn_id = %self.conn_id, reason = %e, "cannot queue reply, closing");
            self.link.evict();
        }
    }

    fn ensure_not_in_room(&self) -> Result<(), HuddleError> {
        match &self.status {
            Status::Connected => Ok(()),
            Status::InRoom { room, .. } => Err(HuddleError::InvalidRequest(format!(
                "already in room {room}; leave it first"
            ))),
        }
    }

    /// The (username, room, token) this connection is bound to, if they
    /// match the ones the client named.
    fn bound_to(
        &self,
        room_name: &RoomName,
        username: &Username,
    ) -> Result<(Username, RoomName, SessionToken), HuddleError> {
        match &self.status {
            Status::InRoom {
                username: bound_user,
                room,
                token,
            } if room == room_name && bound_user == username => {
                Ok((bound_user.clone(), room.clone(), token.clone()))
            }
            _ => Err(RoomError::NotInRoom(username.clone(), room_name.clone()).into()),
        }
    }

    /// Creates a room. A non-blank `username` also joins the creator, so the
    /// client gets `room_created` (with the token) followed by
    /// `room_joined`. A connection already in a room only creates.
    async fn create_room(&mut self, data: CreateRoomData) -> Result<(), HuddleError> {
        let creator = data.username.filter(|u| !u.as_str().trim().is_empty());
        let room = self
            .state
            .rooms
            .create_room(data.room_name, creator.clone())
            .await?;
        let room_name = room.name().clone();

        let joining = creator.filter(|_| matches!(self.status, Status::Connected));
        let Some(username) = joining else {
            self.reply(ServerEvent::RoomCreated {
                room_name,
                token: None,
            });
            return Ok(());
        };

        let token = match self.open_session(&username, &room_name).await {
            Ok(token) => token,
            Err(e) => {
                self.reply(ServerEvent::RoomCreated {
                    room_name,
                    token: None,
                });
                return Err(e);
            }
        };
        self.reply(ServerEvent::RoomCreated {
            room_name,
            token: Some(token.clone()),
        });
        self.enter(&room, username, token).await
    }

    async fn join_room(&mut self, data: JoinRoomData) -> Result<(), HuddleError> {
        self.ensure_not_in_room()?;
        let JoinRoomData {
            room_name,
            username,
        } = data;
        let room = self.state.rooms.get(&room_name).await?;
        let token = self.open_session(&username, &room_name).await?;
        self.enter(&room, username, token).await
    }

    async fn open_session(
        &self,
        username: &Username,
        room_name: &RoomName,
    ) -> Result<SessionToken, HuddleError> {
        let mut sessions = self.state.sessions.lock().await;
        let session = sessions.create_session(username.clone(), room_name.clone(), self.conn_id)?;
        Ok(session.token.clone())
    }

    /// Adds this connection to `room` under the session behind `token`. The
    /// room queues `room_joined` itself; on failure the session is dropped.
    async fn enter(
        &mut self,
        room: &RoomHandle,
        username: Username,
        token: SessionToken,
    ) -> Result<(), HuddleError> {
        let room_name = room.name().clone();
        let greeting = ServerEvent::RoomJoined {
            room_name: room_name.clone(),
            token: token.clone(),
        };
        if let Err(e) = room.join(username.clone(), self.link.clone(), greeting).await {
            self.state.sessions.lock().await.invalidate(&token);
            return Err(e.into());
        }

        tracing::info!(conn_id = %self.conn_id, room = %room_name, %username, "joined room");
        self.status = Status::InRoom {
            username,
            room: room_name,
            token,
        };
        Ok(())
    }

    async fn reconnect_room(&mut self, data: ReconnectRoomData) -> Result<(), HuddleError> {
        self.ensure_not_in_room()?;

        let reconnected = {
            let mut sessions = self.state.sessions.lock().await;
            match sessions.reconnect(&data.token, self.conn_id) {
                Err(SessionError::Expired(session)) => {
                    remove_expired(&self.state.rooms, &session).await;
                    return Err(SessionError::Expired(session).into());
                }
                other => other?,
            }
        };
        let session = reconnected.session;
        if let Some(old) = reconnected.superseded {
            tracing::info!(conn_id = %self.conn_id, superseded = %old, "reconnect took over a live session");
        }

        let greeting = ServerEvent::RoomReconnected {
            room_name: session.room.clone(),
            token: session.token.clone(),
            username: session.username.clone(),
        };
        let reattached = self
            .state
            .rooms
            .reattach(&session.room, session.username.clone(), self.link.clone(), greeting)
            .await;
        if let Err(e) = reattached {
            // The room no longer has this member, so the token is worthless.
            self.state.sessions.lock().await.invalidate(&session.token);
            return Err(e.into());
        }

        tracing::info!(
            conn_id = %self.conn_id,
            room = %session.room,
            username = %session.username,
            "reconnected to room"
        );
        self.status = Status::InRoom {
            username: session.username,
            room: session.room,
            token: session.token,
        };
        Ok(())
    }

    async fn leave_room(&mut self, data: LeaveRoomData) -> Result<(), HuddleError> {
        let (username, room, token) = self.bound_to(&data.room_name, &data.username)?;
        if data.token != token {
            return Err(SessionError::UnknownToken.into());
        }

        let left = {
            let mut sessions = self.state.sessions.lock().await;
            let left = self.state.rooms.leave(&room, username.clone()).await;
            sessions.invalidate(&token);
            left
        };
        self.status = Status::Connected;
        left?;

        tracing::info!(conn_id = %self.conn_id, room = %room, %username, "left room");
        self.reply(ServerEvent::RoomLeft {
            room_name: room,
            token,
        });
        Ok(())
    }

    async fn send_message(&mut self, data: SendMessageData) -> Result<(), HuddleError> {
        let (username, room, _) = self.bound_to(&data.room_name, &data.username)?;
        self.state
            .rooms
            .append_message(&room, username, data.body)
            .await?;
        Ok(())
    }

    /// Gives up this connection's hold on its room.
    ///
    /// After a plain close the member stays in the room, detached, until the
    /// reconnect grace period runs out. An evicted connection, or any close
    /// with no grace period, leaves the room right away and its token stops
    /// working. A connection that was superseded by a reconnect elsewhere no
    /// longer speaks for the session and leaves everything alone.
    async fn release(self, evicted: bool) {
        let Status::InRoom {
            username,
            room,
            token,
        } = self.status
        else {
            return;
        };

        let mut sessions = self.state.sessions.lock().await;
        if sessions.disconnect(self.conn_id).is_none() {
            return;
        }
        let remove = evicted || sessions.config().reconnect_grace_secs == 0;
        let released = if remove {
            sessions.invalidate(&token);
            self.state.rooms.remove_member(&room, username.clone()).await
        } else {
            drop(sessions);
            self.state
                .rooms
                .detach(&room, username.clone(), self.conn_id)
                .await
        };
        match released {
            Ok(_) => tracing::info!(
                conn_id = %self.conn_id,
                room = %room,
                %username,
                removed = remove,
                "released room membership"
            ),
            Err(e) => tracing::warn!(
                conn_id = %self.conn_id,
                room = %room,
                %username,
                error = %e,
                "could not release room membership"
            ),
        }
    }
}
