use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Booking lifecycle. Transitions only move forward:
/// `Pending -> Confirmed -> Refunded` or `Pending -> Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Refunded,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" => Some(BookingStatus::Cancelled),
            "refunded" => Some(BookingStatus::Refunded),
            _ => None,
        }
    }

    pub fn can_transition(self, to: BookingStatus) -> bool {
        matches!(
            (self, to),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Refunded)
    }

    /// Seats of a pending or confirmed booking count as taken regardless of
    /// lease state.
    pub fn holds_seats(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single source of truth for a passenger's purchase. Once a booking is
/// pending or confirmed, its `selected_seats` are the authoritative "taken"
/// signal for those seats; the original leases become irrelevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub bus_id: i64,
    pub selected_seats: Vec<String>,
    pub status: BookingStatus,
    pub passenger_details: serde_json::Value,
    pub contact_info: serde_json::Value,
    pub payment_ref: Option<String>,
    /// Minor currency units.
    pub total_amount: i64,
    pub coins_earned: i64,
    pub coins_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a pending booking.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub user_id: String,
    pub bus_id: i64,
    pub selected_seats: Vec<String>,
    pub passenger_details: serde_json::Value,
    pub contact_info: serde_json::Value,
    pub total_amount: i64,
    pub coins_used: i64,
}
