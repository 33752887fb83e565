//! Broadcast fan-out.
//!
//! Runs inside a room actor. Delivery is best-effort per member: the hub
//! `try_send`s into each outbox and never awaits a socket, so one stalled
//! member can't hold up the rest of the room. A member whose outbox is full
//! or closed is evicted instead: it leaves the room and its connection is
//! told to close.

use huddle_protocol::{RoomName, ServerEvent, Username};

use crate::MemberLink;

/// One entry in a room's membership list.
///
/// `link` is `None` while the member is detached (socket lost, waiting for a
/// reconnect within the grace period, or evicted while being greeted).
#[derive(Debug)]
pub(crate) struct Member {
    pub(crate) username: Username,
    pub(crate) link: Option<MemberLink>,
}

/// The outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// How many members had the event queued.
    pub delivered: usize,
    /// Members whose outbox refused the event. They have been removed from
    /// the room and their connections told to close.
    pub evicted: Vec<Username>,
}

/// Queues `event` for every attached member, in membership order.
///
/// Members that can't take the event are dropped from `members`.
pub(crate) fn fan_out(
    room: &RoomName,
    members: &mut Vec<Member>,
    event: &ServerEvent,
) -> Delivery {
    let mut delivery = Delivery::default();
    members.retain_mut(|member| {
        let outcome = match &member.link {
            Some(link) => link.try_deliver(event.clone()),
            None => return true,
        };
        match outcome {
            Ok(()) => {
                delivery.delivered += 1;
                true
            }
            Err(reason) => {
                evict(room, member, &reason.to_string());
                delivery.evicted.push(member.username.clone());
                false
            }
        }
    });
    delivery
}

/// Detaches `member` and signals its connection to close.
pub(crate) fn evict(room: &RoomName, member: &mut Member, reason: &str) {
    if let Some(link) = member.link.take() {
        tracing::warn!(
            room = %room,
            username = %member.username,
            conn = %link.conn(),
            reason,
            "evicting member"
        );
        link.evict();
    }
}
