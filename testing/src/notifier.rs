//! Notification sink that records everything it is given.

use raffle_core::{NotificationSink, ReservationEvent, ReservationId, ReservationStatus};
use std::sync::{Arc, Mutex};

/// Captures published events for assertions. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<ReservationEvent>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far, in publish order
    #[must_use]
    pub fn events(&self) -> Vec<ReservationEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Target statuses published for one reservation, in order
    #[must_use]
    pub fn transitions(&self, reservation_id: ReservationId) -> Vec<ReservationStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ReservationEvent::StatusChanged {
                    reservation_id: id,
                    to,
                    ..
                } if id == reservation_id => Some(to),
                _ => None,
            })
            .collect()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, event: ReservationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
