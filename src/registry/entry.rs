//! Handle, listener and table types
//!
//! This module defines the per-connection and per-relay state stored in a
//! [`RelayGroup`](super::RelayGroup).

use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionId};
use crate::event::{Event, Filter};
use crate::stats::RelayMetrics;

use super::cancel::Canceller;
use super::config::RelayConfig;

/// Position of a relay instance inside its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayId(pub(crate) usize);

impl std::fmt::Display for RelayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "relay-{}", self.0)
    }
}

/// Veto over broadcast delivery
///
/// Returning `true` stops the whole broadcast pass, not just the delivery to
/// the connection it was asked about. Predicates run after the registry lock
/// is released, so they may call back into any relay of the group.
pub type PreventBroadcast = Arc<dyn Fn(&dyn Connection, &Event) -> bool + Send + Sync>;

/// One open subscription, as seen from the issuing relay's client map
#[derive(Debug)]
pub(crate) struct SubscriptionHandle {
    /// Subscription id, unique among the connection's open handles
    pub(crate) subscription_id: String,

    /// Fired once when the subscription is torn down
    pub(crate) cancel: Canceller,

    /// Relay whose listener table holds the matching entry
    pub(crate) serving: RelayId,

    /// Current position of that entry in the serving relay's table
    pub(crate) listener_index: usize,
}

/// One row of a relay's listener table
pub(crate) struct ListenerEntry {
    /// Subscription id, duplicated so broadcasts can tag envelopes directly
    pub(crate) subscription_id: String,

    /// Match predicate
    pub(crate) filter: Filter,

    /// Destination for matched events
    pub(crate) connection: Arc<dyn Connection>,

    /// Relay whose client map holds the owning handle
    pub(crate) issuing: RelayId,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("subscription_id", &self.subscription_id)
            .field("filter", &self.filter)
            .field("connection", &self.connection.id())
            .field("issuing", &self.issuing)
            .finish()
    }
}

/// A tracked connection and its open handles
#[derive(Debug)]
pub(crate) struct ClientEntry {
    pub(crate) connection: Arc<dyn Connection>,
    pub(crate) handles: Vec<SubscriptionHandle>,
}

/// All state owned by one relay instance
pub(crate) struct RelayTables {
    pub(crate) config: RelayConfig,
    pub(crate) clients: HashMap<ConnectionId, ClientEntry>,
    pub(crate) listeners: Vec<ListenerEntry>,
    pub(crate) prevent_broadcast: Vec<PreventBroadcast>,
    pub(crate) metrics: Arc<RelayMetrics>,
}

impl RelayTables {
    pub(crate) fn new(config: RelayConfig) -> Self {
        Self {
            clients: HashMap::new(),
            listeners: Vec::with_capacity(config.listener_capacity),
            prevent_broadcast: Vec::new(),
            metrics: Arc::default(),
            config,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    /// Find the handle whose listener entry sits at `index` of `serving`'s table
    pub(crate) fn handle_at_mut(
        &mut self,
        connection: ConnectionId,
        serving: RelayId,
        index: usize,
    ) -> Option<&mut SubscriptionHandle> {
        self.clients
            .get_mut(&connection)?
            .handles
            .iter_mut()
            .find(|h| h.serving == serving && h.listener_index == index)
    }
}
