//! Pattern broadcast
//!
//! [`PatternBus`] fans [`PatternUpdate`] messages out to any listening UI over
//! a `tokio::sync::broadcast` channel. Delivery is best effort: with no
//! listener the update is dropped, and a slow listener may lag. Persisted
//! state is what listeners fall back to.

use crate::behavior::encoder::PatternUpdate;
use crate::behavior::types::Pattern;
use tokio::sync::broadcast;

/// Default buffer capacity for the broadcast channel
const DEFAULT_CAPACITY: usize = 64;

/// In-process fan-out of pattern updates
#[derive(Debug, Clone)]
pub struct PatternBus {
    sender: broadcast::Sender<PatternUpdate>,
}

impl PatternBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a pattern to all current subscribers; returns how many received it
    pub fn publish(&self, pattern: Pattern) -> usize {
        // A send error only means there are no subscribers right now
        self.sender.send(PatternUpdate::new(pattern)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PatternUpdate> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PatternBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::types::{PatternKind, PatternStatus};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn pattern(status: PatternStatus) -> Pattern {
        let now = Utc::now();
        Pattern {
            doomscroll_rate: 0.0,
            violence_rate: 0.0,
            avg_violence_score: 0.0,
            status,
            kind: PatternKind::Current,
            window_id: Uuid::new_v4(),
            window_start: now,
            doomscroll_count: 0,
            violence_count: 0,
            detection_counts: BTreeMap::new(),
            timestamp: now,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_same_update() {
        let bus = PatternBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(pattern(PatternStatus::Bad)), 2);

        let a = rx1.recv().await.unwrap();
        let b = rx2.recv().await.unwrap();
        assert_eq!(a.message_type, "pattern_update");
        assert_eq!(a, b);
        assert_eq!(a.data.status, PatternStatus::Bad);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = PatternBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(pattern(PatternStatus::Good)), 0);
    }
}
