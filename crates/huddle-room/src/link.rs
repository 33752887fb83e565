//! The link between a room and one member's connection.
//!
//! A room never touches a socket. It holds a [`MemberLink`]: the sending
//! half of the connection's bounded outbox plus a signal it can fire to
//! tell the connection to close. A writer task on the gateway side drains
//! the outbox into the socket.

use std::sync::Arc;

use huddle_protocol::ServerEvent;
use huddle_transport::ConnectionId;
use tokio::sync::{mpsc, Notify};

/// Why an event could not be queued for a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The outbox is at capacity; the member isn't keeping up.
    #[error("outbox full")]
    Full,

    /// The writer task is gone; the socket is dead.
    #[error("outbox closed")]
    Closed,
}

/// One connection's outbox and eviction signal.
///
/// Cheap to clone. The gateway keeps one copy for its own replies and hands
/// another to the room it joins, so replies and broadcasts share one queue
/// and one order.
#[derive(Debug, Clone)]
pub struct MemberLink {
    conn: ConnectionId,
    outbox: mpsc::Sender<ServerEvent>,
    evicted: Arc<Notify>,
}

impl MemberLink {
    /// Creates a link with an outbox of `capacity` events and returns the
    /// receiving half for the writer task.
    pub fn channel(
        conn: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let link = Self {
            conn,
            outbox: tx,
            evicted: Arc::new(Notify::new()),
        };
        (link, rx)
    }

    /// The connection this link writes to.
    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    /// Queues `event` without waiting.
    pub fn try_deliver(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.outbox.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Tells the connection to close.
    ///
    /// The signal is remembered if nobody is waiting yet.
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// Resolves once [`evict`](Self::evict) has been called on any clone.
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(n: u64) -> ServerEvent {
        ServerEvent::error(huddle_protocol::ErrorCode::InvalidRequest, n.to_string())
    }

    #[tokio::test]
    async fn test_try_deliver_queues_in_order() {
        let (link, mut rx) = MemberLink::channel(ConnectionId::new(1), 4);

        link.try_deliver(event(1)).unwrap();
        link.try_deliver(event(2)).unwrap();

        assert_eq!(rx.recv().await, Some(event(1)));
        assert_eq!(rx.recv().await, Some(event(2)));
    }

    #[tokio::test]
    async fn test_try_deliver_full_outbox_returns_full() {
        let (link, _rx) = MemberLink::channel(ConnectionId::new(1), 1);

        link.try_deliver(event(1)).unwrap();
        let result = link.try_deliver(event(2));

        assert_eq!(result, Err(DeliveryError::Full));
    }

    #[tokio::test]
    async fn test_try_deliver_dropped_receiver_returns_closed() {
        let (link, rx) = MemberLink::channel(ConnectionId::new(1), 4);
        drop(rx);

        assert_eq!(link.try_deliver(event(1)), Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn test_evict_before_wait_is_remembered() {
        let (link, _rx) = MemberLink::channel(ConnectionId::new(1), 4);
        let clone = link.clone();

        clone.evict();

        tokio::time::timeout(Duration::from_secs(1), link.evicted())
            .await
            .expect("eviction signal should already be pending");
    }
}
