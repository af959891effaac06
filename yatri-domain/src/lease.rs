use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A time-bounded, holder-scoped claim on one seat.
///
/// At most one lease with `expires_at` in the future may exist per
/// `(bus_id, seat_number)`. A lease past its `expires_at` is dead on read,
/// whether or not the reaper has deleted the row yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatLease {
    pub bus_id: i64,
    pub seat_number: String,
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SeatLease {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Derived seat state as seen by one viewer. Never stored; always computed
/// from the booking set plus the non-expired leases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Booked,
    LeasedByViewer,
    LeasedByOther,
}
