use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use yatri_domain::{
    BookingStore, ChangeEvent, ChangeOp, ClaimOutcome, EngineError, LeaseStore, SeatStatus,
};
use yatri_store::app_config::BusinessRules;

use crate::feed::ChangeFeed;
use crate::retry::with_retry;

/// Application-facing seat locking API. Composes the lease store with the
/// booked-seat lookups into an all-or-nothing multi-seat claim; the store
/// provides the atomicity, this layer provides validation, retry and feed
/// publication.
pub struct SeatLockManager {
    leases: Arc<dyn LeaseStore>,
    bookings: Arc<dyn BookingStore>,
    feed: ChangeFeed,
    rules: BusinessRules,
}

impl SeatLockManager {
    pub fn new(
        leases: Arc<dyn LeaseStore>,
        bookings: Arc<dyn BookingStore>,
        feed: ChangeFeed,
        rules: BusinessRules,
    ) -> Self {
        Self {
            leases,
            bookings,
            feed,
            rules,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::seconds(self.rules.lease_ttl_seconds as i64)
    }

    /// Claim every seat in `seats` for `holder_id` or none of them. Repeated
    /// claims by the same holder renew the leases with a fresh expiry. On
    /// conflict the full conflicting seat set comes back so the UI can
    /// highlight it.
    pub async fn claim(
        &self,
        bus_id: i64,
        seats: &[String],
        holder_id: &str,
        ttl: Option<Duration>,
    ) -> Result<ClaimOutcome, EngineError> {
        let mut seats: Vec<String> = seats.to_vec();
        seats.sort();
        seats.dedup();

        if seats.is_empty() {
            return Err(EngineError::InvalidClaim("no seats requested".into()));
        }
        if seats.len() > self.rules.max_seats_per_claim as usize {
            return Err(EngineError::InvalidClaim(format!(
                "at most {} seats per claim",
                self.rules.max_seats_per_claim
            )));
        }

        let ttl = ttl.unwrap_or_else(|| self.default_ttl());
        let outcome = with_retry("claim", || {
            self.leases.claim_seats(bus_id, &seats, holder_id, ttl)
        })
        .await?;

        match &outcome {
            ClaimOutcome::Granted(leases) => {
                info!(bus_id, holder = holder_id, seats = leases.len(), "seats leased");
                self.feed.publish_all(
                    leases
                        .iter()
                        .cloned()
                        .map(|l| ChangeEvent::lease(ChangeOp::Inserted, l)),
                );
            }
            ClaimOutcome::Conflict(conflicts) => {
                debug!(bus_id, holder = holder_id, ?conflicts, "claim lost the race");
            }
        }

        Ok(outcome)
    }

    /// Drop every lease the holder has on the bus. Idempotent: releasing a
    /// holder with no leases is a no-op.
    pub async fn release(&self, bus_id: i64, holder_id: &str) -> Result<(), EngineError> {
        let released = self.leases.release_holder(bus_id, holder_id).await?;
        if !released.is_empty() {
            info!(bus_id, holder = holder_id, seats = released.len(), "leases released");
        }
        self.feed.publish_all(
            released
                .into_iter()
                .map(|l| ChangeEvent::lease(ChangeOp::Deleted, l)),
        );
        Ok(())
    }

    /// Derived status of one seat as seen by `viewer_id`. Bookings win over
    /// leases; a lease past its expiry is ignored even if the reaper has not
    /// deleted it yet.
    pub async fn seat_status(
        &self,
        bus_id: i64,
        seat_number: &str,
        viewer_id: &str,
    ) -> Result<SeatStatus, EngineError> {
        let map = self.seat_status_map(bus_id, viewer_id).await?;
        Ok(map
            .get(seat_number)
            .copied()
            .unwrap_or(SeatStatus::Available))
    }

    /// Status of every non-available seat on the bus. Seats absent from the
    /// map are available.
    pub async fn seat_status_map(
        &self,
        bus_id: i64,
        viewer_id: &str,
    ) -> Result<BTreeMap<String, SeatStatus>, EngineError> {
        let mut map = BTreeMap::new();

        for lease in self.leases.leases_for_bus(bus_id).await? {
            let status = if lease.holder_id == viewer_id {
                SeatStatus::LeasedByViewer
            } else {
                SeatStatus::LeasedByOther
            };
            map.insert(lease.seat_number, status);
        }

        // Booking coverage overrides any lingering lease on the same seat.
        for seat in self.bookings.seats_taken(bus_id).await? {
            map.insert(seat, SeatStatus::Booked);
        }

        Ok(map)
    }
}
