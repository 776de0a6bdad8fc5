//! Environment dependencies injected into the reservation services.
//!
//! - [`Clock`]: abstracts time so expiry logic is testable
//! - [`NotificationSink`]: fire-and-forget outlet for status and inventory changes

use crate::types::{OfferingId, ReservationId, ReservationStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clock trait - abstracts time operations for testability
///
/// # Example
///
/// ```
/// use raffle_core::environment::{Clock, SystemClock};
///
/// let now = SystemClock.now();
/// assert!(now.timestamp() > 0);
/// ```
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How an offering's inventory moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "quantity")]
pub enum InventoryChange {
    /// Tickets moved from available to reserved
    Reserved(u32),
    /// Tickets moved from reserved back to available
    Released(u32),
    /// Tickets moved from reserved to sold
    Sold(u32),
}

/// Events published to the notification sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ReservationEvent {
    /// A reservation changed status (`from == None` on creation).
    StatusChanged {
        /// Reservation
        reservation_id: ReservationId,
        /// Offering
        offering_id: OfferingId,
        /// Owner
        user_id: UserId,
        /// Previous status
        from: Option<ReservationStatus>,
        /// New status
        to: ReservationStatus,
        /// When it changed
        at: DateTime<Utc>,
    },
    /// An offering's inventory moved.
    InventoryChanged {
        /// Offering
        offering_id: OfferingId,
        /// What moved
        change: InventoryChange,
        /// When it moved
        at: DateTime<Utc>,
    },
}

/// Outlet for reservation events.
///
/// Delivery is fire-and-forget: implementations must not block, and a
/// failure to deliver never rolls back the operation that produced the event.
pub trait NotificationSink: Send + Sync {
    /// Hand an event to the sink.
    fn notify(&self, event: ReservationEvent);
}
