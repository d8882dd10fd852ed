//! Subscriber fan-out.
//!
//! Maintains the registry of live subscriber connections and broadcasts
//! serialized stock events to every one of them. The registry is owned by
//! the daemon and passed where needed; there is no process-global state.
//!
//! Failure policy: a write failure on one sink deregisters that connection
//! and the broadcast continues to the rest. A slow consumer whose buffer is
//! full is treated the same way; one dead or stuck subscriber must never
//! block delivery to the others.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use stockroom_domain::StockEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Unique identifier for a subscriber connection
pub type ConnectionId = Uuid;

/// Per-connection outbound buffer, in event lines.
const SINK_BUFFER: usize = 64;

// =============================================================================
// Fan-out Registry
// =============================================================================

/// Registry of live subscriber connections.
pub struct Fanout {
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<String>>>,
}

impl Fanout {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new subscriber connection.
    ///
    /// The returned subscription yields newline-terminated JSON event lines,
    /// starting with a `CONNECTED` event. Dropping the subscription
    /// deregisters the connection immediately, without waiting for the next
    /// keep-alive cycle to fail.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (sender, receiver) = mpsc::channel(SINK_BUFFER);
        let id = Uuid::now_v7();

        // Buffer is empty here, so the greeting cannot fail
        let _ = sender.try_send(encode_line(&StockEvent::connected()));

        self.connections.write().unwrap().insert(id, sender);
        debug!(connection_id = %id, "Subscriber connected");

        Subscription {
            id,
            receiver,
            fanout: Arc::clone(self),
        }
    }

    /// Deregister a connection. Idempotent if already removed.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        let removed = self.connections.write().unwrap().remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, "Subscriber disconnected");
        }
        removed
    }

    /// Broadcast an event to all registered connections.
    ///
    /// Returns the number of connections the event was delivered to.
    /// Connections whose sink rejects the write are deregistered.
    pub fn broadcast(&self, event: &StockEvent) -> usize {
        let line = encode_line(event);

        // Snapshot the senders so the write lock is not held across sends.
        // A connection that unsubscribes mid-iteration just yields one
        // harmless failed write.
        let snapshot: Vec<(ConnectionId, mpsc::Sender<String>)> = self
            .connections
            .read()
            .unwrap()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();

        for (id, sender) in snapshot {
            match sender.try_send(line.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "Dropping subscriber after failed write");
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().unwrap();
            for id in dead {
                connections.remove(&id);
            }
        }

        delivered
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.read().unwrap().len()
    }

    /// Register a sink whose receiving half is already gone, simulating a
    /// connection that died without deregistering.
    #[cfg(test)]
    fn register_closed_sink(&self) -> ConnectionId {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let id = Uuid::now_v7();
        self.connections.write().unwrap().insert(id, sender);
        id
    }
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_line(event: &StockEvent) -> String {
    // StockEvent serialization cannot fail: all fields are plain values
    let mut line = serde_json::to_string(event).unwrap_or_default();
    line.push('\n');
    line
}

// =============================================================================
// Subscription
// =============================================================================

/// A live subscriber connection.
///
/// Owns the receiving half of the sink; deregisters itself on drop.
pub struct Subscription {
    id: ConnectionId,
    receiver: mpsc::Receiver<String>,
    fanout: Arc<Fanout>,
}

impl Subscription {
    /// Connection id of this subscription.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receive the next event line.
    ///
    /// Returns `None` once the connection has been deregistered and the
    /// buffer drained.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.fanout.unsubscribe(self.id);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_domain::StockEventKind;

    #[tokio::test]
    async fn test_subscribe_receives_connected_first() {
        let fanout = Arc::new(Fanout::new());
        let mut subscription = fanout.subscribe();

        let line = subscription.recv().await.unwrap();
        let event: StockEvent = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(event.kind, StockEventKind::Connected);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let fanout = Arc::new(Fanout::new());
        let mut sub1 = fanout.subscribe();
        let mut sub2 = fanout.subscribe();

        let delivered = fanout.broadcast(&StockEvent::stock_update(vec![Uuid::now_v7()]));
        assert_eq!(delivered, 2);

        // Skip the CONNECTED greeting on each
        sub1.recv().await.unwrap();
        sub2.recv().await.unwrap();

        let event1: StockEvent = serde_json::from_str(sub1.recv().await.unwrap().trim()).unwrap();
        let event2: StockEvent = serde_json::from_str(sub2.recv().await.unwrap().trim()).unwrap();
        assert_eq!(event1.kind, StockEventKind::StockUpdate);
        assert_eq!(event2.kind, StockEventKind::StockUpdate);
    }

    #[tokio::test]
    async fn test_dead_subscriber_does_not_block_the_rest() {
        let fanout = Arc::new(Fanout::new());

        let dead_id = fanout.register_closed_sink();
        let mut alive = fanout.subscribe();
        assert_eq!(fanout.connection_count(), 2);

        let delivered = fanout.broadcast(&StockEvent::ping());
        assert_eq!(delivered, 1);
        assert_eq!(fanout.connection_count(), 1);
        assert!(!fanout.unsubscribe(dead_id));

        alive.recv().await.unwrap(); // CONNECTED
        let line = alive.recv().await.unwrap();
        let event: StockEvent = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(event.kind, StockEventKind::Ping);
    }

    #[tokio::test]
    async fn test_drop_deregisters_promptly() {
        let fanout = Arc::new(Fanout::new());
        let subscription = fanout.subscribe();
        assert_eq!(fanout.connection_count(), 1);

        drop(subscription);
        assert_eq!(fanout.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_idempotent() {
        let fanout = Arc::new(Fanout::new());
        let subscription = fanout.subscribe();
        let id = subscription.id();

        assert!(fanout.unsubscribe(id));
        assert!(!fanout.unsubscribe(id));
    }
}
