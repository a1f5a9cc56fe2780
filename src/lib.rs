//! Subscription registry and event broadcast core for pub/sub relays
//!
//! Tracks which client connections listen for which [`Filter`]s, matches
//! published [`Event`]s against them and writes [`EventEnvelope`]s to the
//! matching connections. Subscriptions opened on one relay instance can be
//! served by a sibling instance, letting a [`Router`] front several backing
//! relays.
//!
//! ```
//! use std::sync::Arc;
//! use subrelay::{Canceller, Connection, Event, Filter, Relay};
//!
//! let relay = Relay::new();
//! let (conn, mut rx) = relay.accept_channel(16);
//!
//! relay.open_subscription(conn.id(), "sub1", &relay, Filter::new().kinds([1]), Canceller::noop());
//! relay.broadcast(&Arc::new(Event::new("id", "pubkey", 1, 0)));
//!
//! assert_eq!(rx.try_recv().unwrap().subscription_id, "sub1");
//! ```
//!
//! Transport framing, authentication, validation and storage live outside
//! this crate.

pub mod connection;
pub mod error;
pub mod event;
pub mod registry;
pub mod relay;
pub mod router;
pub mod stats;

pub use connection::{ChannelConnection, Connection, ConnectionId};
pub use error::{ConnectionError, ConsistencyError, Error, Result};
pub use event::{Event, EventEnvelope, Filter};
pub use registry::{
    cancel_pair, Canceller, CloseReason, RelayConfig, RelayGroup, RelayId, SubscriptionContext,
};
pub use relay::Relay;
pub use router::{Route, Router};
pub use stats::RelayStats;
