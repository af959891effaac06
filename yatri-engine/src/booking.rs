use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use yatri_domain::{
    Booking, BookingStatus, BookingStore, CancelStep, ChangeEvent, ChangeOp, ConfirmStep,
    EngineError, NewBooking, PendingOutcome, RefundStep,
};
use yatri_store::app_config::BusinessRules;

use crate::feed::ChangeFeed;
use crate::retry::with_retry;

/// Owns the booking lifecycle: `pending -> confirmed -> refunded`,
/// `pending -> cancelled`. Confirmation is idempotent under duplicated
/// payment callbacks; the reward credit and the lease release ride in the
/// store's atomic transition.
pub struct BookingService {
    bookings: Arc<dyn BookingStore>,
    feed: ChangeFeed,
    rules: BusinessRules,
}

impl BookingService {
    pub fn new(bookings: Arc<dyn BookingStore>, feed: ChangeFeed, rules: BusinessRules) -> Self {
        Self {
            bookings,
            feed,
            rules,
        }
    }

    /// Fare for `seats` seats plus the service fee, in minor units. Fee is
    /// expressed in basis points so the currency math stays integral.
    fn quote(&self, fare: i64, seats: usize) -> i64 {
        let subtotal = fare * seats as i64;
        subtotal + subtotal * i64::from(self.rules.service_fee_bps) / 10_000
    }

    /// Create a `pending` booking for seats the holder currently leases.
    /// From here on the booking row, not the lease, is the authoritative
    /// "taken" signal for these seats.
    pub async fn create_pending(
        &self,
        bus_id: i64,
        seats: &[String],
        holder_id: &str,
        passenger_details: serde_json::Value,
        contact_info: serde_json::Value,
    ) -> Result<Booking, EngineError> {
        // Same normalization as the claim path: a seat listed twice must not
        // be charged twice, and the per-claim cap applies here too.
        let mut seats: Vec<String> = seats.to_vec();
        seats.sort();
        seats.dedup();

        if seats.is_empty() {
            return Err(EngineError::InvalidClaim("no seats selected".into()));
        }
        if seats.len() > self.rules.max_seats_per_claim as usize {
            return Err(EngineError::InvalidClaim(format!(
                "at most {} seats per booking",
                self.rules.max_seats_per_claim
            )));
        }

        let fare = self
            .bookings
            .bus_fare(bus_id)
            .await?
            .ok_or(EngineError::BusNotFound(bus_id))?;

        let new = NewBooking {
            user_id: holder_id.to_string(),
            bus_id,
            selected_seats: seats.clone(),
            passenger_details,
            contact_info,
            total_amount: self.quote(fare, seats.len()),
            coins_used: 0,
        };

        let outcome = with_retry("create_pending", || self.bookings.insert_pending(&new)).await?;
        match outcome {
            PendingOutcome::Created(booking) => {
                info!(booking_id = %booking.id, bus_id, "pending booking created");
                self.feed
                    .publish(ChangeEvent::booking(ChangeOp::Inserted, &booking));
                Ok(booking)
            }
            PendingOutcome::SeatsTaken(seats) => Err(EngineError::SeatConflict { seats }),
            PendingOutcome::LeaseMissing(seats) => Err(EngineError::LeaseExpired { seats }),
        }
    }

    /// Drive a booking to `confirmed` once payment is verified. Safe to call
    /// more than once with the same booking id: the duplicate call is a
    /// no-op that neither re-credits the ledger nor errors.
    pub async fn confirm(&self, id: Uuid, payment_ref: &str) -> Result<Booking, EngineError> {
        let reward = self.rules.reward_coins;
        let step = with_retry("confirm", || self.bookings.confirm(id, payment_ref, reward)).await?;

        match step {
            ConfirmStep::Confirmed { booking, released } => {
                info!(booking_id = %id, coins = reward, "booking confirmed");
                self.feed
                    .publish(ChangeEvent::booking(ChangeOp::Updated, &booking));
                self.feed.publish_all(
                    released
                        .into_iter()
                        .map(|l| ChangeEvent::lease(ChangeOp::Deleted, l)),
                );
                Ok(booking)
            }
            ConfirmStep::AlreadyConfirmed(booking) => {
                // Duplicate webhook delivery is expected; swallow it.
                debug!(booking_id = %id, "duplicate confirmation ignored");
                Ok(booking)
            }
            ConfirmStep::NotPending(from) => {
                warn!(booking_id = %id, %from, "confirmation rejected");
                Err(EngineError::InvalidTransition {
                    from,
                    to: BookingStatus::Confirmed,
                })
            }
            ConfirmStep::NotFound => Err(EngineError::BookingNotFound(id)),
        }
    }

    /// `pending -> cancelled`, by user action, checkout timeout or payment
    /// failure. Frees the booking's seats and any lingering leases.
    pub async fn cancel(&self, id: Uuid) -> Result<Booking, EngineError> {
        let step = with_retry("cancel", || self.bookings.cancel(id)).await?;
        match step {
            CancelStep::Cancelled { booking, released } => {
                info!(booking_id = %id, "booking cancelled");
                self.feed
                    .publish(ChangeEvent::booking(ChangeOp::Updated, &booking));
                self.feed.publish_all(
                    released
                        .into_iter()
                        .map(|l| ChangeEvent::lease(ChangeOp::Deleted, l)),
                );
                Ok(booking)
            }
            CancelStep::NotPending(from) => Err(EngineError::InvalidTransition {
                from,
                to: BookingStatus::Cancelled,
            }),
            CancelStep::NotFound => Err(EngineError::BookingNotFound(id)),
        }
    }

    /// `confirmed -> refunded`. The refund workflow itself lives elsewhere;
    /// this transition claws back the earned coins while the wallet still
    /// covers them.
    pub async fn refund(&self, id: Uuid) -> Result<Booking, EngineError> {
        let step = with_retry("refund", || self.bookings.refund(id)).await?;
        match step {
            RefundStep::Refunded {
                booking,
                coins_debited,
            } => {
                info!(booking_id = %id, coins_debited, "booking refunded");
                self.feed
                    .publish(ChangeEvent::booking(ChangeOp::Updated, &booking));
                Ok(booking)
            }
            RefundStep::NotConfirmed(from) => Err(EngineError::InvalidTransition {
                from,
                to: BookingStatus::Refunded,
            }),
            RefundStep::NotFound => Err(EngineError::BookingNotFound(id)),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Booking, EngineError> {
        self.bookings
            .get(id)
            .await?
            .ok_or(EngineError::BookingNotFound(id))
    }
}
