//! In-memory implementation of the storage traits, used by tests and local
//! development. A single mutex around the whole state plays the role the
//! database transaction plays in [`crate::PgStore`]: every trait method is
//! one serialized atomic unit, so the same all-or-nothing and
//! check-then-transition guarantees hold.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use yatri_domain::{
    Booking, BookingStatus, BookingStore, CancelStep, ClaimOutcome, CoinEntry, CoinKind,
    CoinLedger, ConfirmStep, DebitOutcome, LeaseStore, NewBooking, PendingOutcome, RefundStep,
    SeatLease, StorageError,
};

#[derive(Default)]
struct Inner {
    /// bus id -> per-seat fare in minor units.
    buses: HashMap<i64, i64>,
    leases: HashMap<(i64, String), SeatLease>,
    bookings: HashMap<Uuid, Booking>,
    wallets: HashMap<String, i64>,
    entries: Vec<CoinEntry>,
}

impl Inner {
    fn booked_conflicts(&self, bus_id: i64, seats: &[String]) -> Vec<String> {
        let mut out: Vec<String> = self
            .bookings
            .values()
            .filter(|b| b.bus_id == bus_id && b.status.holds_seats())
            .flat_map(|b| b.selected_seats.iter())
            .filter(|s| seats.contains(s))
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn delete_holder_leases(&mut self, bus_id: i64, holder_id: &str) -> Vec<SeatLease> {
        let keys: Vec<(i64, String)> = self
            .leases
            .iter()
            .filter(|(_, l)| l.bus_id == bus_id && l.holder_id == holder_id)
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| self.leases.remove(&k))
            .collect()
    }

    fn push_entry(
        &mut self,
        user_id: &str,
        signed_amount: i64,
        kind: CoinKind,
        booking_id: Option<Uuid>,
        description: &str,
    ) {
        self.entries.push(CoinEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            amount: signed_amount,
            kind,
            booking_id,
            description: Some(description.to_string()),
            created_at: Utc::now(),
        });
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bus(&self, bus_id: i64, fare: i64) {
        self.lock().buses.insert(bus_id, fare);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn claim_seats(
        &self,
        bus_id: i64,
        seats: &[String],
        holder_id: &str,
        ttl: Duration,
    ) -> Result<ClaimOutcome, StorageError> {
        let mut inner = self.lock();
        let now = Utc::now();

        let mut conflicts = inner.booked_conflicts(bus_id, seats);
        for seat in seats {
            if let Some(lease) = inner.leases.get(&(bus_id, seat.clone())) {
                if lease.holder_id != holder_id && lease.is_active(now) {
                    conflicts.push(seat.clone());
                }
            }
        }
        if !conflicts.is_empty() {
            conflicts.sort();
            conflicts.dedup();
            return Ok(ClaimOutcome::Conflict(conflicts));
        }

        let expires_at = now + ttl;
        let mut granted = Vec::with_capacity(seats.len());
        for seat in seats {
            let lease = SeatLease {
                bus_id,
                seat_number: seat.clone(),
                holder_id: holder_id.to_string(),
                acquired_at: now,
                expires_at,
            };
            inner.leases.insert((bus_id, seat.clone()), lease.clone());
            granted.push(lease);
        }
        Ok(ClaimOutcome::Granted(granted))
    }

    async fn release_holder(
        &self,
        bus_id: i64,
        holder_id: &str,
    ) -> Result<Vec<SeatLease>, StorageError> {
        Ok(self.lock().delete_holder_leases(bus_id, holder_id))
    }

    async fn leases_for_bus(&self, bus_id: i64) -> Result<Vec<SeatLease>, StorageError> {
        let now = Utc::now();
        Ok(self
            .lock()
            .leases
            .values()
            .filter(|l| l.bus_id == bus_id && l.is_active(now))
            .cloned()
            .collect())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<SeatLease>, StorageError> {
        let mut inner = self.lock();
        let keys: Vec<(i64, String)> = inner
            .leases
            .iter()
            .filter(|(_, l)| !l.is_active(now))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys
            .into_iter()
            .filter_map(|k| inner.leases.remove(&k))
            .collect())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_pending(&self, new: &NewBooking) -> Result<PendingOutcome, StorageError> {
        let mut inner = self.lock();
        let now = Utc::now();

        let taken = inner.booked_conflicts(new.bus_id, &new.selected_seats);
        if !taken.is_empty() {
            return Ok(PendingOutcome::SeatsTaken(taken));
        }

        let missing: Vec<String> = new
            .selected_seats
            .iter()
            .filter(|seat| {
                inner
                    .leases
                    .get(&(new.bus_id, (*seat).clone()))
                    .map_or(true, |l| l.holder_id != new.user_id || !l.is_active(now))
            })
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Ok(PendingOutcome::LeaseMissing(missing));
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: new.user_id.clone(),
            bus_id: new.bus_id,
            selected_seats: new.selected_seats.clone(),
            status: BookingStatus::Pending,
            passenger_details: new.passenger_details.clone(),
            contact_info: new.contact_info.clone(),
            payment_ref: None,
            total_amount: new.total_amount,
            coins_earned: 0,
            coins_used: new.coins_used,
            created_at: now,
            updated_at: now,
        };
        inner.bookings.insert(booking.id, booking.clone());
        Ok(PendingOutcome::Created(booking))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StorageError> {
        Ok(self.lock().bookings.get(&id).cloned())
    }

    async fn confirm(
        &self,
        id: Uuid,
        payment_ref: &str,
        reward_coins: i64,
    ) -> Result<ConfirmStep, StorageError> {
        let mut inner = self.lock();

        let (user_id, bus_id) = match inner.bookings.get(&id) {
            None => return Ok(ConfirmStep::NotFound),
            Some(b) => match b.status {
                BookingStatus::Pending => (b.user_id.clone(), b.bus_id),
                BookingStatus::Confirmed => return Ok(ConfirmStep::AlreadyConfirmed(b.clone())),
                other => return Ok(ConfirmStep::NotPending(other)),
            },
        };

        let booking = {
            let b = inner
                .bookings
                .get_mut(&id)
                .ok_or_else(|| StorageError::Corrupt("booking vanished mid-confirm".into()))?;
            b.status = BookingStatus::Confirmed;
            b.payment_ref = Some(payment_ref.to_string());
            b.coins_earned = reward_coins;
            b.updated_at = Utc::now();
            b.clone()
        };

        if reward_coins > 0 {
            *inner.wallets.entry(user_id.clone()).or_insert(0) += reward_coins;
            inner.push_entry(
                &user_id,
                reward_coins,
                CoinKind::Earned,
                Some(id),
                "booking reward",
            );
        }

        let released = inner.delete_holder_leases(bus_id, &user_id);
        Ok(ConfirmStep::Confirmed { booking, released })
    }

    async fn cancel(&self, id: Uuid) -> Result<CancelStep, StorageError> {
        let mut inner = self.lock();

        match inner.bookings.get(&id) {
            None => return Ok(CancelStep::NotFound),
            Some(b) if b.status != BookingStatus::Pending => {
                return Ok(CancelStep::NotPending(b.status))
            }
            Some(_) => {}
        }

        let booking = {
            let b = inner
                .bookings
                .get_mut(&id)
                .ok_or_else(|| StorageError::Corrupt("booking vanished mid-cancel".into()))?;
            b.status = BookingStatus::Cancelled;
            b.updated_at = Utc::now();
            b.clone()
        };
        let released = inner.delete_holder_leases(booking.bus_id, &booking.user_id);
        Ok(CancelStep::Cancelled { booking, released })
    }

    async fn refund(&self, id: Uuid) -> Result<RefundStep, StorageError> {
        let mut inner = self.lock();

        match inner.bookings.get(&id) {
            None => return Ok(RefundStep::NotFound),
            Some(b) if b.status != BookingStatus::Confirmed => {
                return Ok(RefundStep::NotConfirmed(b.status))
            }
            Some(_) => {}
        }

        let booking = {
            let b = inner
                .bookings
                .get_mut(&id)
                .ok_or_else(|| StorageError::Corrupt("booking vanished mid-refund".into()))?;
            b.status = BookingStatus::Refunded;
            b.updated_at = Utc::now();
            b.clone()
        };

        let mut coins_debited = 0;
        if booking.coins_earned > 0 {
            let balance = inner.wallets.entry(booking.user_id.clone()).or_insert(0);
            if *balance >= booking.coins_earned {
                *balance -= booking.coins_earned;
                coins_debited = booking.coins_earned;
                inner.push_entry(
                    &booking.user_id,
                    -coins_debited,
                    CoinKind::Used,
                    Some(id),
                    "booking refund clawback",
                );
            }
        }

        Ok(RefundStep::Refunded {
            booking,
            coins_debited,
        })
    }

    async fn seats_taken(&self, bus_id: i64) -> Result<Vec<String>, StorageError> {
        let inner = self.lock();
        let mut out: Vec<String> = inner
            .bookings
            .values()
            .filter(|b| b.bus_id == bus_id && b.status.holds_seats())
            .flat_map(|b| b.selected_seats.iter().cloned())
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    async fn cancel_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(Booking, Vec<SeatLease>)>, StorageError> {
        let mut inner = self.lock();
        let stale: Vec<Uuid> = inner
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at <= cutoff)
            .map(|b| b.id)
            .collect();

        let mut cancelled = Vec::with_capacity(stale.len());
        for id in stale {
            let booking = {
                let b = inner
                    .bookings
                    .get_mut(&id)
                    .ok_or_else(|| StorageError::Corrupt("booking vanished mid-sweep".into()))?;
                b.status = BookingStatus::Cancelled;
                b.updated_at = Utc::now();
                b.clone()
            };
            let released = inner.delete_holder_leases(booking.bus_id, &booking.user_id);
            cancelled.push((booking, released));
        }
        Ok(cancelled)
    }

    async fn bus_fare(&self, bus_id: i64) -> Result<Option<i64>, StorageError> {
        Ok(self.lock().buses.get(&bus_id).copied())
    }
}

#[async_trait]
impl CoinLedger for MemoryStore {
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        description: &str,
    ) -> Result<i64, StorageError> {
        let mut inner = self.lock();
        let balance = {
            let balance = inner.wallets.entry(user_id.to_string()).or_insert(0);
            *balance += amount;
            *balance
        };
        inner.push_entry(user_id, amount, CoinKind::Earned, booking_id, description);
        Ok(balance)
    }

    async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        description: &str,
    ) -> Result<DebitOutcome, StorageError> {
        let mut inner = self.lock();
        let current = inner.wallets.get(user_id).copied().unwrap_or(0);
        if current < amount {
            return Ok(DebitOutcome::Insufficient { balance: current });
        }
        let balance = {
            let balance = inner.wallets.entry(user_id.to_string()).or_insert(0);
            *balance -= amount;
            *balance
        };
        inner.push_entry(user_id, -amount, CoinKind::Used, booking_id, description);
        Ok(DebitOutcome::Applied(balance))
    }

    async fn balance(&self, user_id: &str) -> Result<i64, StorageError> {
        Ok(self.lock().wallets.get(user_id).copied().unwrap_or(0))
    }

    async fn entries(&self, user_id: &str) -> Result<Vec<CoinEntry>, StorageError> {
        let inner = self.lock();
        let mut out: Vec<CoinEntry> = inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    async fn reconcile(&self, user_id: &str) -> Result<bool, StorageError> {
        let inner = self.lock();
        let balance = inner.wallets.get(user_id).copied().unwrap_or(0);
        let total: i64 = inner
            .entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.amount)
            .sum();
        Ok(balance == total)
    }
}
