//! Client connections
//!
//! The transport owns connections; the registry only keys on their id and
//! writes envelopes into them. Writes run inline on the broadcasting thread,
//! so implementations must never block.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ConnectionError;
use crate::event::EventEnvelope;

/// Identity of one connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Sink for outbound messages of a single client
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Connection identity, stable for the connection's lifetime
    fn id(&self) -> ConnectionId;

    /// Queue an envelope for delivery without blocking
    fn write(&self, envelope: EventEnvelope) -> Result<(), ConnectionError>;

    /// Whether the peer is known to be gone
    fn is_closed(&self) -> bool {
        false
    }
}

/// Connection backed by a bounded tokio channel
///
/// The receiving half is driven by the transport (e.g. a websocket writer task).
#[derive(Debug)]
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<EventEnvelope>,
}

impl ChannelConnection {
    /// Create a connection and the receiver its envelopes arrive on
    pub fn new(id: ConnectionId, buffer: usize) -> (Arc<Self>, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Arc::new(Self { id, tx }), rx)
    }
}

impl Connection for ChannelConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn write(&self, envelope: EventEnvelope) -> Result<(), ConnectionError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ConnectionError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => ConnectionError::Closed,
        })
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::event::Event;

    fn envelope() -> EventEnvelope {
        EventEnvelope::new("sub", Arc::new(Event::new("aa", "pk", 1, 0)))
    }

    #[tokio::test]
    async fn test_write_and_receive() {
        let (conn, mut rx) = ChannelConnection::new(ConnectionId(7), 4);
        assert_eq!(conn.id(), ConnectionId(7));

        assert_ok!(conn.write(envelope()));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.subscription_id, "sub");
    }

    #[test]
    fn test_backpressure() {
        let (conn, _rx) = ChannelConnection::new(ConnectionId(1), 1);

        assert_ok!(conn.write(envelope()));
        assert_eq!(assert_err!(conn.write(envelope())), ConnectionError::Backpressure);
        assert!(!conn.is_closed());
    }

    #[test]
    fn test_closed_receiver() {
        let (conn, rx) = ChannelConnection::new(ConnectionId(1), 4);
        drop(rx);

        assert!(conn.is_closed());
        assert_eq!(assert_err!(conn.write(envelope())), ConnectionError::Closed);
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionId(3).to_string(), "conn-3");
    }
}
