//! Relay instance
//!
//! A [`Relay`] is a cheap, cloneable handle onto one relay instance's client
//! map and listener table inside a [`RelayGroup`]. These are the operations the
//! connection layer (open/close/disconnect) and the ingestion layer (broadcast)
//! call into.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::connection::{ChannelConnection, Connection, ConnectionId};
use crate::event::{Event, EventEnvelope, Filter};
use crate::registry::{Canceller, CloseReason, RelayConfig, RelayGroup, RelayId};
use crate::stats::RelayStats;

/// Handle to one relay instance
#[derive(Clone)]
pub struct Relay {
    id: RelayId,
    group: RelayGroup,
    config: Arc<RelayConfig>,
}

impl Relay {
    /// Create a relay in a new group with default configuration
    pub fn new() -> Self {
        Self::with_config(RelayConfig::default())
    }

    /// Create a relay in a new group
    pub fn with_config(config: RelayConfig) -> Self {
        Self::in_group(RelayGroup::new(), config)
    }

    fn in_group(group: RelayGroup, config: RelayConfig) -> Self {
        let id = group.add_relay(config.clone());
        Self {
            id,
            group,
            config: Arc::new(config),
        }
    }

    /// Create another relay instance sharing this relay's lock
    ///
    /// Only siblings can serve each other's subscriptions.
    pub fn sibling(&self, config: RelayConfig) -> Relay {
        Self::in_group(self.group.clone(), config)
    }

    /// Position of this relay within its group
    pub fn id(&self) -> RelayId {
        self.id
    }

    /// Relay name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The group this relay belongs to
    pub fn group(&self) -> &RelayGroup {
        &self.group
    }

    /// Whether `other` shares this relay's lock
    pub fn is_sibling(&self, other: &Relay) -> bool {
        self.group.same_group(&other.group)
    }

    /// Allocate a fresh connection id
    pub fn next_connection_id(&self) -> ConnectionId {
        self.group.next_connection_id()
    }

    /// Start tracking a connection
    ///
    /// Returns false if a connection with the same id is already tracked.
    pub fn add_connection(&self, connection: Arc<dyn Connection>) -> bool {
        self.group.add_connection(self.id, connection)
    }

    /// Create and track a channel-backed connection
    pub fn accept_channel(
        &self,
        buffer: usize,
    ) -> (Arc<ChannelConnection>, mpsc::Receiver<EventEnvelope>) {
        let (connection, rx) = ChannelConnection::new(self.next_connection_id(), buffer);
        self.add_connection(connection.clone());
        (connection, rx)
    }

    /// Forget a disconnected client and all of its subscriptions
    ///
    /// Each subscription is cancelled with [`CloseReason::ConnectionClosed`].
    pub fn remove_connection(&self, connection: ConnectionId) {
        self.group
            .remove_connection(self.id, connection, CloseReason::ConnectionClosed);
    }

    /// Open a subscription for a tracked connection
    ///
    /// The handle lives in this relay's client map; the listener entry goes
    /// into `serving`'s table, which is `self` unless the subscription is
    /// routed. Untracked connections and relays from another group are
    /// ignored.
    pub fn open_subscription(
        &self,
        connection: ConnectionId,
        subscription_id: &str,
        serving: &Relay,
        filter: Filter,
        cancel: Canceller,
    ) {
        if !self.is_sibling(serving) {
            tracing::warn!(
                relay = %self.name(),
                serving = %serving.name(),
                conn = %connection,
                sub = subscription_id,
                "Serving relay belongs to another group, open ignored"
            );
            return;
        }

        self.group
            .open(self.id, connection, subscription_id, serving.id, filter, cancel);
    }

    /// Close every subscription of `connection` with this id
    ///
    /// Each one is cancelled with [`CloseReason::ClosedByClient`].
    pub fn close_subscription(&self, connection: ConnectionId, subscription_id: &str) {
        self.group.close(self.id, connection, subscription_id);
    }

    /// Filters currently in this relay's listener table, in table order
    pub fn listening_filters(&self) -> Vec<Filter> {
        self.group.listening_filters(self.id)
    }

    /// Deliver an event to this relay's matching listeners
    ///
    /// Suppression predicates are consulted for each matching listener in
    /// table order; the first veto ends the whole pass, so no later listener
    /// receives the event either.
    pub fn broadcast(&self, event: &Arc<Event>) {
        self.group.notify(self.id, event);
    }

    /// Append a broadcast suppression predicate
    ///
    /// The predicate runs without the registry lock held and may query or
    /// modify any relay of the group.
    pub fn prevent_broadcast<F>(&self, prevent: F)
    where
        F: Fn(&dyn Connection, &Event) -> bool + Send + Sync + 'static,
    {
        self.group.add_prevent_broadcast(self.id, Arc::new(prevent));
    }

    /// Number of entries in this relay's listener table
    pub fn listener_count(&self) -> usize {
        self.group.listener_count(self.id)
    }

    /// Number of tracked connections
    pub fn connection_count(&self) -> usize {
        self.group.connection_count(self.id)
    }

    /// Open subscription ids of a connection
    pub fn subscription_ids(&self, connection: ConnectionId) -> Vec<String> {
        self.group.subscription_ids(self.id, connection)
    }

    /// Current statistics
    pub fn stats(&self) -> RelayStats {
        self.group.stats(self.id)
    }

    /// Forget every tracked connection whose peer is gone
    ///
    /// Returns how many connections were removed.
    pub fn reap_closed(&self) -> usize {
        self.group
            .remove_connections_where(self.id, CloseReason::ConnectionClosed, |c| c.is_closed())
            .len()
    }

    /// Spawn background reaper task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_reaper(&self) -> tokio::task::JoinHandle<()> {
        let relay = self.clone();
        let interval = relay.config.reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reaped = relay.reap_closed();
                if reaped > 0 {
                    tracing::debug!(relay = %relay.name(), reaped = reaped, "Reaped closed connections");
                }
            }
        })
    }

    /// Drop every tracked connection
    ///
    /// Each subscription is cancelled with [`CloseReason::RelayShutdown`].
    pub fn shutdown(&self) {
        let removed = self
            .group
            .remove_connections_where(self.id, CloseReason::RelayShutdown, |_| true);

        tracing::info!(
            relay = %self.name(),
            connections = removed.len(),
            "Relay shut down"
        );
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .finish_non_exhaustive()
    }
}
