//! Storage traits. Each method is one atomic unit of work: the backend
//! commits all of its effects or none of them. Cross-request invariants are
//! enforced here, not by application-level mutexes.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus, NewBooking};
use crate::coins::CoinEntry;
use crate::error::StorageError;
use crate::lease::SeatLease;

/// Result of an all-or-nothing multi-seat claim.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// Every requested seat was free or already held by the claimant; all
    /// leases now carry a fresh expiry.
    Granted(Vec<SeatLease>),
    /// At least one seat was taken. No lease was created or renewed.
    Conflict(Vec<String>),
}

/// Result of creating a pending booking.
#[derive(Debug, Clone)]
pub enum PendingOutcome {
    Created(Booking),
    /// Overlaps a pending/confirmed booking on the same bus.
    SeatsTaken(Vec<String>),
    /// The holder does not hold a live lease for these seats.
    LeaseMissing(Vec<String>),
}

#[derive(Debug, Clone)]
pub enum ConfirmStep {
    /// First confirmation: status flipped, reward credited, leases released.
    Confirmed {
        booking: Booking,
        released: Vec<SeatLease>,
    },
    /// Duplicate delivery; nothing was mutated.
    AlreadyConfirmed(Booking),
    NotPending(BookingStatus),
    NotFound,
}

#[derive(Debug, Clone)]
pub enum CancelStep {
    Cancelled {
        booking: Booking,
        released: Vec<SeatLease>,
    },
    NotPending(BookingStatus),
    NotFound,
}

#[derive(Debug, Clone)]
pub enum RefundStep {
    Refunded {
        booking: Booking,
        /// Coins clawed back, zero when the wallet could not cover them.
        coins_debited: i64,
    },
    NotConfirmed(BookingStatus),
    NotFound,
}

#[derive(Debug, Clone)]
pub enum DebitOutcome {
    /// New balance after the debit.
    Applied(i64),
    /// The wallet held less than the requested amount; nothing was written.
    Insufficient { balance: i64 },
}

/// Durable table of active seat leases with atomic claim/renew/release.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// All-or-nothing claim: within one atomic unit, reject if any requested
    /// seat is covered by a pending/confirmed booking or by a live lease held
    /// by someone else; otherwise insert or renew every lease with
    /// `expires_at = now + ttl`. A failed claim leaves no partial leases.
    async fn claim_seats(
        &self,
        bus_id: i64,
        seats: &[String],
        holder_id: &str,
        ttl: Duration,
    ) -> Result<ClaimOutcome, StorageError>;

    /// Delete every lease the holder has on the bus. Idempotent; returns the
    /// deleted leases so the caller can publish them.
    async fn release_holder(
        &self,
        bus_id: i64,
        holder_id: &str,
    ) -> Result<Vec<SeatLease>, StorageError>;

    /// Non-expired leases for a bus. Rows past `expires_at` are filtered out
    /// here regardless of reaper cadence.
    async fn leases_for_bus(&self, bus_id: i64) -> Result<Vec<SeatLease>, StorageError>;

    /// Delete leases with `expires_at <= now`. Housekeeping only; correctness
    /// never depends on this running.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<SeatLease>, StorageError>;
}

/// Owns booking rows and the atomic lifecycle transitions around them.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Create a `pending` booking. Atomically verifies no seat overlaps
    /// another pending/confirmed booking and that the holder has a live lease
    /// for every seat.
    async fn insert_pending(&self, booking: &NewBooking) -> Result<PendingOutcome, StorageError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StorageError>;

    /// Atomic check-then-transition `pending -> confirmed`. On first success
    /// the reward is credited to the ledger and the holder's leases on the
    /// bus are deleted, all in the same unit of work. A repeat call reports
    /// `AlreadyConfirmed` without mutating anything.
    async fn confirm(
        &self,
        id: Uuid,
        payment_ref: &str,
        reward_coins: i64,
    ) -> Result<ConfirmStep, StorageError>;

    /// Atomic `pending -> cancelled`; releases the holder's leases.
    async fn cancel(&self, id: Uuid) -> Result<CancelStep, StorageError>;

    /// Atomic `confirmed -> refunded`; claws back earned coins when the
    /// wallet still covers them.
    async fn refund(&self, id: Uuid) -> Result<RefundStep, StorageError>;

    /// Distinct seats covered by pending/confirmed bookings on a bus.
    async fn seats_taken(&self, bus_id: i64) -> Result<Vec<String>, StorageError>;

    /// Cancel pending bookings created at or before `cutoff`; the checkout
    /// timeout policy. Returns each cancelled booking with the leases freed
    /// alongside it.
    async fn cancel_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(Booking, Vec<SeatLease>)>, StorageError>;

    /// Base fare for one seat on a bus, in minor units.
    async fn bus_fare(&self, bus_id: i64) -> Result<Option<i64>, StorageError>;
}

/// Append-only reward/debit log with an atomically maintained balance.
#[async_trait]
pub trait CoinLedger: Send + Sync {
    /// Append an `earned` entry and bump the balance in one unit of work.
    /// Returns the new balance. `amount` is a positive magnitude.
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        description: &str,
    ) -> Result<i64, StorageError>;

    /// Append a `used` entry and decrement the balance, rejecting any debit
    /// the balance cannot cover.
    async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        description: &str,
    ) -> Result<DebitOutcome, StorageError>;

    async fn balance(&self, user_id: &str) -> Result<i64, StorageError>;

    async fn entries(&self, user_id: &str) -> Result<Vec<CoinEntry>, StorageError>;

    /// Checked invariant: maintained balance equals the signed sum of the
    /// user's entries.
    async fn reconcile(&self, user_id: &str) -> Result<bool, StorageError>;
}
