//! Routing front relay
//!
//! A [`Router`] fronts several backing relays. Clients connect to the front;
//! each subscription is served by the first route whose filter matcher accepts
//! it, and each published event is broadcast on the first route whose event
//! matcher accepts it. Anything no route claims stays on the front relay.
//!
//! ```text
//!   client ──► front (client map) ──┬─► route "notes"  (listener table)
//!                                   ├─► route "chat"   (listener table)
//!                                   └─► front          (listener table)
//! ```

use std::sync::Arc;

use crate::connection::ConnectionId;
use crate::event::{Event, Filter};
use crate::registry::{Canceller, RelayConfig};
use crate::relay::Relay;

type FilterMatcher = Box<dyn Fn(&Filter) -> bool + Send + Sync>;
type EventMatcher = Box<dyn Fn(&Event) -> bool + Send + Sync>;

/// A backing relay and the traffic it claims
pub struct Route {
    relay: Relay,
    filter_matcher: FilterMatcher,
    event_matcher: EventMatcher,
}

impl Route {
    /// The backing relay
    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

/// Front relay with ordered routes to sibling relays
#[derive(Debug)]
pub struct Router {
    front: Relay,
    routes: Vec<Route>,
}

impl Router {
    /// Create a router around a front relay
    pub fn new(front: Relay) -> Self {
        Self {
            front,
            routes: Vec::new(),
        }
    }

    /// Append a route backed by a new sibling of the front relay
    ///
    /// Returns the backing relay.
    pub fn route<F, E>(
        &mut self,
        config: RelayConfig,
        filter_matcher: F,
        event_matcher: E,
    ) -> Relay
    where
        F: Fn(&Filter) -> bool + Send + Sync + 'static,
        E: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let relay = self.front.sibling(config);

        tracing::info!(
            front = %self.front.name(),
            route = %relay.name(),
            position = self.routes.len(),
            "Route added"
        );

        self.routes.push(Route {
            relay: relay.clone(),
            filter_matcher: Box::new(filter_matcher),
            event_matcher: Box::new(event_matcher),
        });

        relay
    }

    /// The front relay
    pub fn front(&self) -> &Relay {
        &self.front
    }

    /// Routes in evaluation order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Relay whose listener table should hold a subscription with `filter`
    pub fn serving_relay(&self, filter: &Filter) -> &Relay {
        self.routes
            .iter()
            .find(|r| (r.filter_matcher)(filter))
            .map(|r| &r.relay)
            .unwrap_or(&self.front)
    }

    /// Relay that should broadcast `event`
    pub fn ingest_relay(&self, event: &Event) -> &Relay {
        self.routes
            .iter()
            .find(|r| (r.event_matcher)(event))
            .map(|r| &r.relay)
            .unwrap_or(&self.front)
    }

    /// Open a subscription through the front relay, served where it routes
    pub fn open_subscription(
        &self,
        connection: ConnectionId,
        subscription_id: &str,
        filter: Filter,
        cancel: Canceller,
    ) {
        let serving = self.serving_relay(&filter);
        self.front
            .open_subscription(connection, subscription_id, serving, filter, cancel);
    }

    /// Close a subscription opened through the front relay
    pub fn close_subscription(&self, connection: ConnectionId, subscription_id: &str) {
        self.front.close_subscription(connection, subscription_id);
    }

    /// Broadcast an event on the relay it routes to
    pub fn broadcast(&self, event: &Arc<Event>) {
        self.ingest_relay(event).broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;

    fn kind_router() -> (Router, Relay) {
        let mut router = Router::new(Relay::with_config(RelayConfig::named("front")));
        let chat = router.route(
            RelayConfig::named("chat"),
            |f| matches!(f.kinds.as_deref(), Some([42])),
            |e| e.kind == 42,
        );
        (router, chat)
    }

    #[test]
    fn test_serving_relay_selection() {
        let (router, chat) = kind_router();

        assert_eq!(router.serving_relay(&Filter::new().kinds([42])).id(), chat.id());
        assert_eq!(
            router.serving_relay(&Filter::new().kinds([1])).id(),
            router.front().id()
        );
        assert_eq!(router.routes().len(), 1);
    }

    #[test]
    fn test_first_route_wins() {
        let mut router = Router::new(Relay::new());
        let first = router.route(RelayConfig::named("first"), |_| true, |_| true);
        router.route(RelayConfig::named("second"), |_| true, |_| true);

        let event = Event::new("a", "pk", 1, 0);
        assert_eq!(router.serving_relay(&Filter::new()).id(), first.id());
        assert_eq!(router.ingest_relay(&event).id(), first.id());
    }

    #[test]
    fn test_routed_delivery_and_close() {
        let (router, chat) = kind_router();
        let front = router.front().clone();
        let (conn, mut rx) = front.accept_channel(8);

        router.open_subscription(conn.id(), "chat", Filter::new().kinds([42]), Canceller::noop());
        router.open_subscription(conn.id(), "notes", Filter::new().kinds([1]), Canceller::noop());
        assert_eq!(chat.listener_count(), 1);
        assert_eq!(front.listener_count(), 1);

        router.broadcast(&Arc::new(Event::new("c", "pk", 42, 0)));
        assert_eq!(rx.try_recv().unwrap().subscription_id, "chat");

        router.broadcast(&Arc::new(Event::new("n", "pk", 1, 0)));
        assert_eq!(rx.try_recv().unwrap().subscription_id, "notes");

        router.close_subscription(conn.id(), "chat");
        assert_eq!(chat.listener_count(), 0);
        assert_eq!(front.listener_count(), 1);

        router.broadcast(&Arc::new(Event::new("c2", "pk", 42, 0)));
        assert!(rx.try_recv().is_err());
        front.group().check_consistency().unwrap();
    }

    #[test]
    fn test_disconnect_clears_routes() {
        let (router, chat) = kind_router();
        let front = router.front().clone();
        let (conn, _rx) = front.accept_channel(8);

        router.open_subscription(conn.id(), "chat", Filter::new().kinds([42]), Canceller::noop());
        front.remove_connection(conn.id());

        assert_eq!(chat.listener_count(), 0);
        assert!(chat.listening_filters().is_empty());
    }
}
