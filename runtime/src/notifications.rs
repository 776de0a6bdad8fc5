//! Notification sinks.
//!
//! Core transitions never wait on, or fail because of, a sink.

use raffle_core::{NotificationSink, ReservationEvent};
use tokio::sync::broadcast;

/// Logs every event. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, event: ReservationEvent) {
        match event {
            ReservationEvent::StatusChanged {
                reservation_id,
                offering_id,
                from,
                to,
                ..
            } => tracing::debug!(
                reservation_id = %reservation_id,
                offering_id = %offering_id,
                from = from.map_or("none", |s| s.as_str()),
                to = %to,
                "Reservation status changed"
            ),
            ReservationEvent::InventoryChanged {
                offering_id,
                change,
                ..
            } => tracing::debug!(offering_id = %offering_id, change = ?change, "Inventory changed"),
        }
    }
}

/// Fans events out to in-process subscribers over a Tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; publishers never block.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ReservationEvent>,
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn notify(&self, event: ReservationEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use raffle_core::{InventoryChange, OfferingId};

    fn event() -> ReservationEvent {
        ReservationEvent::InventoryChanged {
            offering_id: OfferingId::new(),
            change: InventoryChange::Reserved(2),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        let sent = event();
        notifier.notify(sent.clone());
        assert_eq!(rx.recv().await.unwrap(), sent);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        BroadcastNotifier::new(1).notify(event());
        TracingNotifier.notify(event());
    }
}
