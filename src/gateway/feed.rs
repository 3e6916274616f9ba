//! In-process change feed.
//!
//! One broadcast channel carries every row change of every collection. Subscriptions
//! filter it down to what they watch.

use tokio::sync::broadcast;
use tracing::trace;

use super::ChangeEvent;

/// Broadcast channel of row changes.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed buffering `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: ChangeEvent) {
        trace!(table = %event.table, kind = ?event.kind, "Emitting change event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers. Each mounted subscription holds one.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Collection;
    use serde_json::json;

    #[tokio::test]
    async fn test_emit_receive() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();

        feed.emit(ChangeEvent::insert(Collection::Themes, json!({ "id": "t1" })));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, Collection::Themes);
        assert_eq!(event.field("id"), Some("t1"));
    }

    #[test]
    fn test_subscriber_count_tracks_drops() {
        let feed = ChangeFeed::default();
        assert_eq!(feed.subscriber_count(), 0);

        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(rx1);
        drop(rx2);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let feed = ChangeFeed::new(4);
        feed.emit(ChangeEvent::insert(Collection::Questions, json!({ "id": "q1" })));
    }
}
