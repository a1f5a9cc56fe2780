//! Outbound event envelope
//!
//! One event is shared by every envelope produced during a broadcast pass;
//! cloning an envelope only bumps the `Arc` and copies the subscription id.

use std::sync::Arc;

use bytes::Bytes;
use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

use super::Event;
use crate::error::Result;

/// An event tagged with the subscription it was matched for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Subscription id, scoped to the receiving connection
    pub subscription_id: String,
    /// The matched event
    pub event: Arc<Event>,
}

impl EventEnvelope {
    /// Create a new envelope
    pub fn new(subscription_id: impl Into<String>, event: Arc<Event>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            event,
        }
    }

    /// Render as a `["EVENT", <subscription id>, <event>]` JSON frame
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

impl Serialize for EventEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element("EVENT")?;
        tuple.serialize_element(&self.subscription_id)?;
        tuple.serialize_element(self.event.as_ref())?;
        tuple.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame() {
        let event = Arc::new(Event::new("aa", "pk", 1, 42).with_content("hi"));
        let envelope = EventEnvelope::new("sub1", event);

        let frame = envelope.encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();

        assert_eq!(value[0], "EVENT");
        assert_eq!(value[1], "sub1");
        assert_eq!(value[2]["id"], "aa");
        assert_eq!(value[2]["content"], "hi");
        assert_eq!(value[2]["created_at"], 42);
    }

    #[test]
    fn test_clone_shares_event() {
        let event = Arc::new(Event::new("aa", "pk", 1, 42));
        let envelope = EventEnvelope::new("sub1", Arc::clone(&event));
        let copy = envelope.clone();

        assert!(Arc::ptr_eq(&envelope.event, &copy.event));
        assert_eq!(Arc::strong_count(&event), 3);
    }
}
