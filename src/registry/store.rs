//! Shared registry state for a group of relay instances
//!
//! Every relay that can route subscriptions to another lives in the same
//! group, and the group holds the only lock. Open, close and disconnect take
//! the write lock once and may touch the tables of several relays; broadcasts
//! match filters under the read lock and deliver after releasing it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::{Connection, ConnectionId};
use crate::event::{Event, EventEnvelope, Filter};
use crate::error::ConsistencyError;
use crate::stats::{RelayMetrics, RelayStats};

use super::cancel::{Canceller, CloseReason};
use super::config::RelayConfig;
use super::entry::{
    ClientEntry, ListenerEntry, PreventBroadcast, RelayId, RelayTables, SubscriptionHandle,
};

/// Lock domain shared by every relay reachable through routing
///
/// Cheap to clone; clones refer to the same tables.
#[derive(Clone)]
pub struct RelayGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    /// Indexed by `RelayId`; relays are never removed from a group
    relays: RwLock<Vec<RelayTables>>,

    next_connection_id: AtomicU64,
}

impl RelayGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GroupInner {
                relays: RwLock::new(Vec::new()),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Whether two handles refer to the same group
    pub fn same_group(&self, other: &RelayGroup) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of relay instances in the group
    pub fn relay_count(&self) -> usize {
        self.inner.relays.read().len()
    }

    /// Allocate a connection id unique within the group
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn add_relay(&self, config: RelayConfig) -> RelayId {
        let mut relays = self.inner.relays.write();
        let id = RelayId(relays.len());

        tracing::debug!(relay = %config.name, id = %id, "Relay instance added");
        relays.push(RelayTables::new(config));

        id
    }

    /// Start tracking a connection in `relay`'s client map
    ///
    /// Returns false if the connection was already tracked.
    pub(crate) fn add_connection(&self, relay: RelayId, connection: Arc<dyn Connection>) -> bool {
        let mut relays = self.inner.relays.write();
        let tables = &mut relays[relay.0];
        let conn_id = connection.id();

        if tables.clients.contains_key(&conn_id) {
            return false;
        }

        let handles = Vec::with_capacity(tables.config.handles_per_connection);
        tables
            .clients
            .insert(conn_id, ClientEntry { connection, handles });

        tracing::info!(
            relay = %tables.name(),
            conn = %conn_id,
            connections = tables.clients.len(),
            "Connection added"
        );

        true
    }

    /// Open a subscription on `issuing`'s client map, served by `serving`
    ///
    /// Calling this repeatedly for the same connection and id adds independent
    /// listeners that a later close removes together. Returns false, dropping
    /// the canceller unfired, if the connection is no longer tracked.
    pub(crate) fn open(
        &self,
        issuing: RelayId,
        conn_id: ConnectionId,
        subscription_id: &str,
        serving: RelayId,
        filter: Filter,
        cancel: Canceller,
    ) -> bool {
        let mut relays = self.inner.relays.write();

        let Some(client) = relays[issuing.0].clients.get(&conn_id) else {
            // Client disconnected between accept and subscribe
            tracing::debug!(
                relay = %relays[issuing.0].name(),
                conn = %conn_id,
                sub = subscription_id,
                "Open on untracked connection ignored"
            );
            return false;
        };
        let connection = Arc::clone(&client.connection);

        let listener_index = relays[serving.0].listeners.len();
        relays[serving.0].listeners.push(ListenerEntry {
            subscription_id: subscription_id.to_string(),
            filter,
            connection,
            issuing,
        });

        if let Some(client) = relays[issuing.0].clients.get_mut(&conn_id) {
            client.handles.push(SubscriptionHandle {
                subscription_id: subscription_id.to_string(),
                cancel,
                serving,
                listener_index,
            });
        }

        tracing::debug!(
            relay = %relays[issuing.0].name(),
            serving = %relays[serving.0].name(),
            conn = %conn_id,
            sub = subscription_id,
            index = listener_index,
            "Subscription opened"
        );

        true
    }

    /// Close every handle of `conn_id` with this subscription id
    ///
    /// Returns how many handles were removed.
    pub(crate) fn close(
        &self,
        issuing: RelayId,
        conn_id: ConnectionId,
        subscription_id: &str,
    ) -> usize {
        let mut relays = self.inner.relays.write();

        let Some(client) = relays[issuing.0].clients.get_mut(&conn_id) else {
            return 0;
        };

        // Two-pointer compaction: kept handles move forward in order, matched
        // ones collect behind the write cursor and are never revisited.
        let handles = &mut client.handles;
        let mut write = 0;
        for read in 0..handles.len() {
            if handles[read].subscription_id != subscription_id {
                handles.swap(write, read);
                write += 1;
            }
        }
        let closed: Vec<SubscriptionHandle> = handles.drain(write..).collect();

        if closed.is_empty() {
            return 0;
        }

        let count = closed.len();
        let positions = closed
            .into_iter()
            .map(|handle| {
                handle.cancel.cancel(CloseReason::ClosedByClient);
                (handle.serving, handle.listener_index)
            })
            .collect();
        remove_listeners(&mut relays, positions);

        tracing::debug!(
            relay = %relays[issuing.0].name(),
            conn = %conn_id,
            sub = subscription_id,
            removed = count,
            "Subscription closed"
        );

        count
    }

    /// Forget a connection, removing all of its handles and listener entries
    ///
    /// Returns how many handles were removed, or `None` if the connection
    /// was not tracked.
    pub(crate) fn remove_connection(
        &self,
        issuing: RelayId,
        conn_id: ConnectionId,
        reason: CloseReason,
    ) -> Option<usize> {
        let mut relays = self.inner.relays.write();
        let removed = remove_client(&mut relays, issuing, conn_id, reason)?;

        tracing::info!(
            relay = %relays[issuing.0].name(),
            conn = %conn_id,
            reason = %reason,
            subscriptions = removed,
            "Connection removed"
        );

        Some(removed)
    }

    /// Forget every connection of `issuing` matching `pred`
    ///
    /// Returns the removed connection ids.
    pub(crate) fn remove_connections_where<F>(
        &self,
        issuing: RelayId,
        reason: CloseReason,
        mut pred: F,
    ) -> Vec<ConnectionId>
    where
        F: FnMut(&dyn Connection) -> bool,
    {
        let mut relays = self.inner.relays.write();

        let mut doomed: Vec<ConnectionId> = relays[issuing.0]
            .clients
            .iter()
            .filter(|(_, client)| pred(client.connection.as_ref()))
            .map(|(id, _)| *id)
            .collect();
        doomed.sort_unstable();

        for conn_id in &doomed {
            remove_client(&mut relays, issuing, *conn_id, reason);
        }

        if !doomed.is_empty() {
            tracing::info!(
                relay = %relays[issuing.0].name(),
                reason = %reason,
                connections = doomed.len(),
                "Connections removed"
            );
        }

        doomed
    }

    /// Deliver `event` to every matching listener of `relay`
    ///
    /// Listeners are visited in table order. The first time any suppression
    /// predicate fires for a matching listener the whole pass stops: neither
    /// that listener nor any later one receives the event. Write failures are
    /// counted and otherwise ignored.
    ///
    /// Filters are matched under the read lock. Predicates and writes run on
    /// a snapshot of the matched listeners once the lock is released, so they
    /// may call back into the group. A subscription closed while the pass is
    /// running can still receive this event.
    pub(crate) fn notify(&self, relay: RelayId, event: &Arc<Event>) {
        let pass = {
            let relays = self.inner.relays.read();
            let tables = &relays[relay.0];
            BroadcastPass {
                relay: tables.name().to_string(),
                targets: tables
                    .listeners
                    .iter()
                    .filter(|l| l.filter.matches(event))
                    .map(|l| (l.subscription_id.clone(), Arc::clone(&l.connection)))
                    .collect(),
                prevent_broadcast: tables.prevent_broadcast.clone(),
                metrics: Arc::clone(&tables.metrics),
            }
        };

        pass.run(event);
    }

    pub(crate) fn add_prevent_broadcast(&self, relay: RelayId, prevent: PreventBroadcast) {
        self.inner.relays.write()[relay.0]
            .prevent_broadcast
            .push(prevent);
    }

    /// Snapshot of the filters in `relay`'s listener table, in table order
    pub(crate) fn listening_filters(&self, relay: RelayId) -> Vec<Filter> {
        self.inner.relays.read()[relay.0]
            .listeners
            .iter()
            .map(|l| l.filter.clone())
            .collect()
    }

    pub(crate) fn listener_count(&self, relay: RelayId) -> usize {
        self.inner.relays.read()[relay.0].listeners.len()
    }

    pub(crate) fn connection_count(&self, relay: RelayId) -> usize {
        self.inner.relays.read()[relay.0].clients.len()
    }

    /// Open subscription ids of a connection, one per handle, in handle order
    pub(crate) fn subscription_ids(&self, relay: RelayId, conn_id: ConnectionId) -> Vec<String> {
        self.inner.relays.read()[relay.0]
            .clients
            .get(&conn_id)
            .map(|client| {
                client
                    .handles
                    .iter()
                    .map(|h| h.subscription_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn stats(&self, relay: RelayId) -> RelayStats {
        let relays = self.inner.relays.read();
        let tables = &relays[relay.0];
        tables
            .metrics
            .snapshot(tables.clients.len(), tables.listeners.len())
    }

    /// Check that every handle in the group points at its own listener entry
    /// and that every listener entry is owned by exactly one handle
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        let relays = self.inner.relays.read();
        let mut owned = 0;

        for (issuing, tables) in relays.iter().enumerate() {
            for (conn_id, client) in &tables.clients {
                for handle in &client.handles {
                    let listener = relays
                        .get(handle.serving.0)
                        .and_then(|serving| serving.listeners.get(handle.listener_index))
                        .ok_or_else(|| ConsistencyError::Dangling {
                            connection: *conn_id,
                            subscription_id: handle.subscription_id.clone(),
                            serving: handle.serving,
                            index: handle.listener_index,
                        })?;

                    if listener.subscription_id != handle.subscription_id
                        || listener.connection.id() != *conn_id
                        || listener.issuing != RelayId(issuing)
                    {
                        return Err(ConsistencyError::Mismatch {
                            connection: *conn_id,
                            subscription_id: handle.subscription_id.clone(),
                            serving: handle.serving,
                            index: handle.listener_index,
                        });
                    }
                    owned += 1;
                }
            }
        }

        let listeners: usize = relays.iter().map(|t| t.listeners.len()).sum();
        if owned != listeners {
            return Err(ConsistencyError::Orphaned {
                handles: owned,
                listeners,
            });
        }

        Ok(())
    }
}

impl Default for RelayGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RelayGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayGroup")
            .field("relays", &self.relay_count())
            .finish_non_exhaustive()
    }
}

/// Matched listeners of one broadcast, detached from the registry lock
struct BroadcastPass {
    relay: String,
    targets: Vec<(String, Arc<dyn Connection>)>,
    prevent_broadcast: Vec<PreventBroadcast>,
    metrics: Arc<RelayMetrics>,
}

impl BroadcastPass {
    fn run(self, event: &Arc<Event>) {
        self.metrics.record_broadcast();

        for (subscription_id, connection) in self.targets {
            if self
                .prevent_broadcast
                .iter()
                .any(|prevent| prevent(connection.as_ref(), event.as_ref()))
            {
                self.metrics.record_suppressed();
                tracing::debug!(
                    relay = %self.relay,
                    conn = %connection.id(),
                    event = %event,
                    "Broadcast suppressed"
                );
                return;
            }

            let envelope = EventEnvelope::new(subscription_id.as_str(), Arc::clone(event));
            match connection.write(envelope) {
                Ok(()) => {
                    self.metrics.record_delivery();
                    tracing::trace!(
                        relay = %self.relay,
                        conn = %connection.id(),
                        sub = %subscription_id,
                        "Event delivered"
                    );
                }
                Err(e) => {
                    self.metrics.record_write_failure();
                    tracing::trace!(
                        relay = %self.relay,
                        conn = %connection.id(),
                        sub = %subscription_id,
                        error = %e,
                        "Event write failed"
                    );
                }
            }
        }
    }
}

/// Remove a client entry and every listener its handles own
fn remove_client(
    relays: &mut [RelayTables],
    issuing: RelayId,
    conn_id: ConnectionId,
    reason: CloseReason,
) -> Option<usize> {
    let client = relays[issuing.0].clients.remove(&conn_id)?;
    let count = client.handles.len();

    let positions = client
        .handles
        .into_iter()
        .map(|handle| {
            handle.cancel.cancel(reason);
            (handle.serving, handle.listener_index)
        })
        .collect();
    remove_listeners(relays, positions);

    Some(count)
}

/// Swap-remove listener entries whose handles are already gone
///
/// Within each table the highest position goes first, so the entry moved into
/// a vacated slot always belongs to a live handle, whose index is then fixed.
fn remove_listeners(relays: &mut [RelayTables], mut positions: Vec<(RelayId, usize)>) {
    positions.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    for (serving, index) in positions {
        let listeners = &mut relays[serving.0].listeners;
        let last = listeners.len().saturating_sub(1);
        if index >= listeners.len() {
            tracing::warn!(
                serving = %serving,
                index = index,
                listeners = listeners.len(),
                "Listener index out of range"
            );
            continue;
        }

        listeners.swap_remove(index);
        if index == last {
            continue;
        }

        let moved = &listeners[index];
        let (owner, moved_conn) = (moved.issuing, moved.connection.id());
        match relays[owner.0].handle_at_mut(moved_conn, serving, last) {
            Some(handle) => handle.listener_index = index,
            None => tracing::warn!(
                serving = %serving,
                conn = %moved_conn,
                index = last,
                "Moved listener has no owning handle"
            ),
        }
    }
}
