//! Notification types and bus
//!
//! Human-facing state-change notifications are published fire-and-forget
//! on a broadcast bus: entering Fabricate, entering Failed, and chain
//! revival. Slow or absent subscribers never block the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Engine notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// A chain entered Fabricate state
    ChainFabricating {
        chain_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A chain entered Failed state
    ChainFailed {
        chain_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// A stalled chain was revived into a fresh one
    ChainRevived {
        prior_chain_id: Uuid,
        new_chain_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for engine notifications.
///
/// Wraps `tokio::sync::broadcast`: non-blocking publish, any number of
/// subscribers, automatic cleanup when receivers drop.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Publish fire-and-forget. Having zero subscribers is not an error.
    pub fn emit(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_fine() {
        let bus = NotificationBus::new(8);
        bus.emit(Notification::ChainFailed {
            chain_id: Uuid::new_v4(),
            message: "test".into(),
            timestamp: Utc::now(),
        });
    }

    #[test]
    fn subscribers_receive_notifications() {
        let bus = NotificationBus::new(8);
        let mut rx = bus.subscribe();
        let chain_id = Uuid::new_v4();
        bus.emit(Notification::ChainFabricating {
            chain_id,
            message: "fabricating".into(),
            timestamp: Utc::now(),
        });
        match rx.try_recv().unwrap() {
            Notification::ChainFabricating { chain_id: got, .. } => assert_eq!(got, chain_id),
            other => panic!("unexpected notification {other:?}"),
        }
    }
}
