//! Room actor: an isolated Tokio task that owns one chat room.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. Membership changes, message sequencing and
//! fan-out all happen inside that task, one command at a time, which is
//! what gives a room a single message order.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use huddle_protocol::{ChatMessage, RoomName, ServerEvent, Username};
use huddle_transport::ConnectionId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::hub::{self, Delivery, Member};
use crate::{MemberLink, RoomConfig, RoomError};

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in each variant is a "reply channel": the caller
/// sends a command and waits for the response on that channel.
pub(crate) enum RoomCommand {
    /// Add a new member and queue `greeting` to it.
    Join {
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Give an existing member a new connection.
    Reattach {
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Drop a member's connection handle if it still belongs to `conn`.
    Detach {
        username: Username,
        conn: ConnectionId,
        reply: oneshot::Sender<bool>,
    },

    /// Remove a member entirely.
    Remove {
        username: Username,
        reply: oneshot::Sender<bool>,
    },

    /// Accept a chat message and broadcast it.
    Post {
        username: Username,
        body: String,
        reply: oneshot::Sender<Result<(ChatMessage, Delivery), RoomError>>,
    },

    /// Broadcast a server-originated event.
    Publish {
        event: ServerEvent,
        reply: oneshot::Sender<Delivery>,
    },

    /// Request a metadata snapshot.
    Info { reply: oneshot::Sender<RoomInfo> },

    /// Request the retained history.
    History {
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
}

/// A snapshot of room metadata, as served by the room directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub name: RoomName,
    /// Usernames in join order, attached or not.
    pub members: Vec<Username>,
    pub member_count: usize,
    /// Members with a live connection.
    pub connected_count: usize,
    /// Messages currently retained in history.
    pub message_count: usize,
    /// Sequence number of the last accepted message, 0 if none.
    pub last_seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Username>,
}

/// Handle to a running room actor. Used to send commands to it.
///
/// This is cheap to clone: it's just an `mpsc::Sender` wrapper.
/// The `RoomStore` holds one of these per room.
#[derive(Clone)]
pub struct RoomHandle {
    name: RoomName,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's name.
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// Sends `cmd` and waits for the reply on `reply_rx`.
    async fn request<T>(
        &self,
        cmd: RoomCommand,
        reply_rx: oneshot::Receiver<T>,
    ) -> Result<T, RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.name.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.name.clone()))
    }

    /// Adds `username` as a new member reached through `link`.
    ///
    /// `greeting` is queued before anything the room broadcasts afterwards.
    pub async fn join(
        &self,
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
    ) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::Join {
                username,
                link,
                greeting,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Points an existing member at a new connection.
    ///
    /// A previous live connection, if any, is evicted.
    pub async fn reattach(
        &self,
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
    ) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::Reattach {
                username,
                link,
                greeting,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Detaches `username` if its handle belongs to `conn`.
    ///
    /// Returns `false` when the member is gone or already points at another
    /// connection.
    pub async fn detach(
        &self,
        username: Username,
        conn: ConnectionId,
    ) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::Detach {
                username,
                conn,
                reply,
            },
            rx,
        )
        .await
    }

    /// Removes `username` from the member list. Returns whether it was
    /// there.
    pub async fn remove(&self, username: Username) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Remove { username, reply }, rx)
            .await
    }

    /// Appends a message from `username` and broadcasts it.
    pub async fn post(
        &self,
        username: Username,
        body: String,
    ) -> Result<(ChatMessage, Delivery), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::Post {
                username,
                body,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Broadcasts `event` to every attached member.
    pub async fn publish(&self, event: ServerEvent) -> Result<Delivery, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Publish { event, reply }, rx).await
    }

    /// Requests the current room info.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Info { reply }, rx).await
    }

    /// Requests the retained history, oldest first.
    pub async fn history(&self) -> Result<Vec<ChatMessage>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::History { reply }, rx).await
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    name: RoomName,
    created_by: Option<Username>,
    config: RoomConfig,
    /// Join order is broadcast order.
    members: Vec<Member>,
    history: VecDeque<ChatMessage>,
    last_seq: u64,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop until every handle is dropped.
    async fn run(mut self) {
        tracing::debug!(room = %self.name, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    username,
                    link,
                    greeting,
                    reply,
                } => {
                    let _ = reply.send(self.handle_join(username, link, greeting));
                }
                RoomCommand::Reattach {
                    username,
                    link,
                    greeting,
                    reply,
                } => {
                    let _ = reply.send(self.handle_reattach(username, link, greeting));
                }
                RoomCommand::Detach {
                    username,
                    conn,
                    reply,
                } => {
                    let _ = reply.send(self.handle_detach(&username, conn));
                }
                RoomCommand::Remove { username, reply } => {
                    let _ = reply.send(self.handle_remove(&username));
                }
                RoomCommand::Post {
                    username,
                    body,
                    reply,
                } => {
                    let _ = reply.send(self.handle_post(username, body));
                }
                RoomCommand::Publish { event, reply } => {
                    let _ = reply.send(hub::fan_out(&self.name, &mut self.members, &event));
                }
                RoomCommand::Info { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::History { reply } => {
                    let _ = reply.send(self.history.iter().cloned().collect());
                }
            }
        }

        tracing::debug!(room = %self.name, "room actor stopped");
    }

    fn position(&self, username: &Username) -> Option<usize> {
        self.members.iter().position(|m| &m.username == username)
    }

    fn handle_join(
        &mut self,
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
    ) -> Result<(), RoomError> {
        if self.position(&username).is_some() {
            return Err(RoomError::AlreadyMember(username, self.name.clone()));
        }

        let conn = link.conn();
        let mut member = Member {
            username,
            link: Some(link),
        };
        self.greet(&mut member, greeting, false);

        tracing::info!(
            room = %self.name,
            username = %member.username,
            %conn,
            members = self.members.len() + 1,
            "member joined"
        );
        self.members.push(member);
        Ok(())
    }

    fn handle_reattach(
        &mut self,
        username: Username,
        link: MemberLink,
        greeting: ServerEvent,
    ) -> Result<(), RoomError> {
        let idx = self
            .position(&username)
            .ok_or_else(|| RoomError::NotInRoom(username, self.name.clone()))?;
        let replay = self.config.replay_on_reconnect;

        let conn = link.conn();
        let mut member = Member {
            username: self.members[idx].username.clone(),
            link: Some(link),
        };
        if let Some(old) = self.members[idx].link.take() {
            if old.conn() != conn {
                tracing::info!(
                    room = %self.name,
                    username = %member.username,
                    old = %old.conn(),
                    "connection superseded by reconnect"
                );
                old.evict();
            }
        }
        self.greet(&mut member, greeting, replay);

        tracing::info!(
            room = %self.name,
            username = %member.username,
            %conn,
            "member reattached"
        );
        self.members[idx] = member;
        Ok(())
    }

    /// Queues the greeting, then the history if `replay` is set.
    fn greet(&self, member: &mut Member, greeting: ServerEvent, replay: bool) {
        let history = self
            .history
            .iter()
            .filter(|_| replay)
            .cloned()
            .map(ServerEvent::MessageReceived);

        for event in std::iter::once(greeting).chain(history) {
            let Some(link) = &member.link else { return };
            if let Err(reason) = link.try_deliver(event) {
                hub::evict(&self.name, member, &reason.to_string());
                return;
            }
        }
    }

    fn handle_detach(&mut self, username: &Username, conn: ConnectionId) -> bool {
        let Some(idx) = self.position(username) else {
            return false;
        };
        let member = &mut self.members[idx];
        if member.link.as_ref().map(MemberLink::conn) != Some(conn) {
            return false;
        }
        member.link = None;
        tracing::info!(room = %self.name, %username, %conn, "member detached");
        true
    }

    fn handle_remove(&mut self, username: &Username) -> bool {
        let Some(idx) = self.position(username) else {
            return false;
        };
        self.members.remove(idx);
        tracing::info!(
            room = %self.name,
            %username,
            members = self.members.len(),
            "member left"
        );
        true
    }

    fn handle_post(
        &mut self,
        username: Username,
        body: String,
    ) -> Result<(ChatMessage, Delivery), RoomError> {
        if self.position(&username).is_none() {
            return Err(RoomError::NotInRoom(username, self.name.clone()));
        }
        if body.trim().is_empty() {
            return Err(RoomError::InvalidMessage("body must not be empty".into()));
        }
        if body.len() > self.config.max_body_len {
            return Err(RoomError::InvalidMessage(format!(
                "body exceeds {} bytes",
                self.config.max_body_len
            )));
        }

        self.last_seq += 1;
        let message = ChatMessage {
            room_name: self.name.clone(),
            username,
            body,
            seq: self.last_seq,
            timestamp: now_millis(),
        };

        self.history.push_back(message.clone());
        while self.history.len() > self.config.history_limit {
            self.history.pop_front();
        }

        let event = ServerEvent::MessageReceived(message.clone());
        let delivery = hub::fan_out(&self.name, &mut self.members, &event);
        tracing::debug!(
            room = %self.name,
            seq = message.seq,
            delivered = delivery.delivered,
            evicted = delivery.evicted.len(),
            "message broadcast"
        );
        Ok((message, delivery))
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            name: self.name.clone(),
            members: self.members.iter().map(|m| m.username.clone()).collect(),
            member_count: self.members.len(),
            connected_count: self.members.iter().filter(|m| m.link.is_some()).count(),
            message_count: self.history.len(),
            last_seq: self.last_seq,
            created_by: self.created_by.clone(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// `config.command_channel_size` controls backpressure: if the channel
/// fills up, senders will wait (bounded channel).
pub(crate) fn spawn_room(
    name: RoomName,
    created_by: Option<Username>,
    config: RoomConfig,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.command_channel_size.max(1));

    let actor = RoomActor {
        name: name.clone(),
        created_by,
        config,
        members: Vec::new(),
        history: VecDeque::new(),
        last_seq: 0,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    RoomHandle { name, sender: tx }
}
