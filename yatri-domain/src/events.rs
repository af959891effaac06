use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::lease::SeatLease;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Inserted,
    Updated,
    Deleted,
}

/// Slimmed booking view carried on the feed. Subscribers re-fetch for full
/// detail; the event is a hint, never the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSummary {
    pub id: Uuid,
    pub bus_id: i64,
    pub status: BookingStatus,
    pub selected_seats: Vec<String>,
}

impl From<&Booking> for BookingSummary {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id,
            bus_id: b.bus_id,
            status: b.status,
            selected_seats: b.selected_seats.clone(),
        }
    }
}

/// Closed, tagged payload set: every mutation the feed can carry decodes
/// into one of these at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entity", content = "payload", rename_all = "snake_case")]
pub enum ChangePayload {
    Lease(SeatLease),
    Booking(BookingSummary),
}

/// One mutation, scoped to a bus. Delivery is at-least-once and unordered
/// across seats; same-seat events arrive in write order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub bus_id: i64,
    pub op: ChangeOp,
    #[serde(flatten)]
    pub payload: ChangePayload,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn lease(op: ChangeOp, lease: SeatLease) -> Self {
        Self {
            bus_id: lease.bus_id,
            op,
            payload: ChangePayload::Lease(lease),
            occurred_at: Utc::now(),
        }
    }

    pub fn booking(op: ChangeOp, booking: &Booking) -> Self {
        Self {
            bus_id: booking.bus_id,
            op,
            payload: ChangePayload::Booking(BookingSummary::from(booking)),
            occurred_at: Utc::now(),
        }
    }

    /// Kafka topic this event is mirrored to.
    pub fn topic(&self) -> &'static str {
        match (&self.payload, self.op) {
            (ChangePayload::Lease(_), ChangeOp::Inserted) => "seats.leased",
            (ChangePayload::Lease(_), ChangeOp::Updated) => "seats.renewed",
            (ChangePayload::Lease(_), ChangeOp::Deleted) => "seats.released",
            (ChangePayload::Booking(b), _) if b.status == BookingStatus::Confirmed => {
                "booking.confirmed"
            }
            (ChangePayload::Booking(_), ChangeOp::Inserted) => "booking.created",
            (ChangePayload::Booking(_), _) => "booking.updated",
        }
    }
}
