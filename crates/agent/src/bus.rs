//! Per-session event fan-out.
//!
//! Grounded on `gateway/src/runtime/mod.rs`'s subscribe-forward pattern
//! (sub-agent events re-broadcast onto the parent's bus) generalized from a
//! single process-wide registry into an explicit, constructor-injected
//! service.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use opal_domain::event::AgentEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Owns one broadcast channel per session. A session's channel is created
/// lazily on first `subscribe` or `publish` and removed explicitly when the
/// session closes.
pub struct EventBus {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<AgentEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity, channels: RwLock::new(HashMap::new()) }
    }

    fn sender(&self, session_id: &str) -> broadcast::Sender<AgentEvent> {
        if let Some(tx) = self.channels.read().get(session_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write();
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to a session's event stream. The RPC server does this
    /// exactly once per `session/start`.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<AgentEvent> {
        self.sender(session_id).subscribe()
    }

    /// Fan out an event to every current subscriber. A session with no
    /// subscribers (e.g. between `session/start` calls) is not an error —
    /// the event is simply dropped, matching broadcast-channel semantics.
    pub fn publish(&self, session_id: &str, event: AgentEvent) {
        let _ = self.sender(session_id).send(event);
    }

    /// Drop the channel for a closed session so it stops holding history
    /// in the broadcast ring buffer.
    pub fn remove(&self, session_id: &str) {
        self.channels.write().remove(session_id);
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.channels
            .read()
            .get(session_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("s1");
        let mut b = bus.subscribe("s1");
        bus.publish("s1", AgentEvent::AgentStart);
        assert!(matches!(a.recv().await.unwrap(), AgentEvent::AgentStart));
        assert!(matches!(b.recv().await.unwrap(), AgentEvent::AgentStart));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish("ghost", AgentEvent::AgentStart);
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("s1");
        let _b = bus.subscribe("s2");
        bus.publish("s2", AgentEvent::AgentStart);
        tokio::time::timeout(std::time::Duration::from_millis(20), a.recv())
            .await
            .expect_err("s1 subscriber must not observe s2's events");
    }

    #[test]
    fn remove_drops_the_channel() {
        let bus = EventBus::new();
        let _rx = bus.subscribe("s1");
        assert_eq!(bus.subscriber_count("s1"), 1);
        bus.remove("s1");
        assert_eq!(bus.subscriber_count("s1"), 0);
    }
}
