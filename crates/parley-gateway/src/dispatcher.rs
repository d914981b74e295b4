use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use parley_types::events::GatewayEvent;
use parley_types::models::Destination;

/// A connection's current destination subscriptions, shared between the
/// registry and that connection's send loop.
pub type SubscriptionSet = Arc<std::sync::RwLock<HashSet<Destination>>>;

/// Subscriber registry plus event bus. Created once at process start and
/// handed to both the REST layer (publish) and the WebSocket layer
/// (register/subscribe); entries are removed on disconnect.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast bus — every live connection receives every event and
    /// filters against its own subscription set. A lagging receiver drops
    /// events instead of blocking other connections.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Live connections: conn_id -> entry
    connections: RwLock<HashMap<Uuid, ConnectionEntry>>,
}

struct ConnectionEntry {
    #[allow(dead_code)]
    user_id: Uuid,
    subscriptions: SubscriptionSet,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Tap the event bus. Each connection's send loop holds one receiver.
    pub fn events(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to all live connections. Fire-and-forget: a send
    /// error only means nobody is connected.
    pub fn publish(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a new connection. Returns its id and subscription set.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, SubscriptionSet) {
        let conn_id = Uuid::new_v4();
        let subscriptions: SubscriptionSet =
            Arc::new(std::sync::RwLock::new(HashSet::new()));
        self.inner.connections.write().await.insert(
            conn_id,
            ConnectionEntry {
                user_id,
                subscriptions: subscriptions.clone(),
            },
        );
        (conn_id, subscriptions)
    }

    /// Drop a connection's registry entry. Mandatory on disconnect.
    pub async fn unregister(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Add destinations to a connection's subscription set.
    pub async fn subscribe(&self, conn_id: Uuid, destinations: Vec<Destination>) {
        let connections = self.inner.connections.read().await;
        if let Some(entry) = connections.get(&conn_id) {
            entry
                .subscriptions
                .write()
                .expect("subscription lock poisoned")
                .extend(destinations);
        }
    }

    /// Remove destinations from a connection's subscription set.
    pub async fn unsubscribe(&self, conn_id: Uuid, destinations: Vec<Destination>) {
        let connections = self.inner.connections.read().await;
        if let Some(entry) = connections.get(&conn_id) {
            let mut subs = entry
                .subscriptions
                .write()
                .expect("subscription lock poisoned");
            for destination in destinations {
                subs.remove(&destination);
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}

/// Whether a broadcast event should be delivered to a connection with the
/// given subscriptions. Events without a destination are connection-local
/// and never travel over the bus.
pub fn wants_event(subscriptions: &HashSet<Destination>, event: &GatewayEvent) -> bool {
    match event.destination() {
        Some(destination) => subscriptions.contains(&destination),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::models::Message;

    fn message_event(destination: Destination) -> GatewayEvent {
        GatewayEvent::MessageCreate {
            message: Message {
                id: Uuid::new_v4(),
                sender_id: Uuid::new_v4(),
                sender_username: "ada".into(),
                content: "hello".into(),
                destination,
                created_at: chrono::Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn registry_entries_are_removed_on_unregister() {
        let dispatcher = Dispatcher::new();
        let (conn_id, _subs) = dispatcher.register(Uuid::new_v4()).await;
        assert_eq!(dispatcher.connection_count().await, 1);

        dispatcher.unregister(conn_id).await;
        assert_eq!(dispatcher.connection_count().await, 0);
    }

    #[tokio::test]
    async fn published_events_reach_bus_receivers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.events();

        let dest = Destination::Channel(Uuid::new_v4());
        dispatcher.publish(message_event(dest));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.destination(), Some(dest));
    }

    #[tokio::test]
    async fn subscription_filter_matches_destination_exactly() {
        let dispatcher = Dispatcher::new();
        let (conn_id, subs) = dispatcher.register(Uuid::new_v4()).await;

        let channel = Destination::Channel(Uuid::new_v4());
        let other_channel = Destination::Channel(Uuid::new_v4());
        let dm = Destination::DmGroup(Uuid::new_v4());

        dispatcher.subscribe(conn_id, vec![channel, dm]).await;

        {
            let subs = subs.read().unwrap();
            assert!(wants_event(&subs, &message_event(channel)));
            assert!(wants_event(&subs, &message_event(dm)));
            assert!(!wants_event(&subs, &message_event(other_channel)));
        }

        dispatcher.unsubscribe(conn_id, vec![channel]).await;
        {
            let subs = subs.read().unwrap();
            assert!(!wants_event(&subs, &message_event(channel)));
            assert!(wants_event(&subs, &message_event(dm)));
        }
    }

    #[tokio::test]
    async fn ready_events_never_fan_out() {
        let subs: HashSet<Destination> =
            [Destination::Channel(Uuid::new_v4())].into_iter().collect();
        let ready = GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
            username: "ada".into(),
        };
        assert!(!wants_event(&subs, &ready));
    }
}
