use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use yatri_domain::{
    Booking, BookingStatus, BookingStore, CancelStep, CoinKind, ConfirmStep, NewBooking,
    PendingOutcome, RefundStep, SeatLease, StorageError,
};

use crate::database::{map_sqlx, PgStore};
use crate::ledger_repo::{adjust_wallet_guarded, bump_wallet, insert_coin_entry};
use crate::lease_repo::{booked_conflicts, LeaseRow};

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    bus_id: i64,
    selected_seats: Vec<String>,
    booking_status: String,
    passenger_details: serde_json::Value,
    contact_info: serde_json::Value,
    payment_ref: Option<String>,
    total_amount: i64,
    coins_earned: i64,
    coins_used: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StorageError;

    fn try_from(r: BookingRow) -> Result<Self, StorageError> {
        let status = BookingStatus::parse(&r.booking_status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown booking status {:?}", r.booking_status))
        })?;
        Ok(Booking {
            id: r.id,
            user_id: r.user_id,
            bus_id: r.bus_id,
            selected_seats: r.selected_seats,
            status,
            passenger_details: r.passenger_details,
            contact_info: r.contact_info,
            payment_ref: r.payment_ref,
            total_amount: r.total_amount,
            coins_earned: r.coins_earned,
            coins_used: r.coins_used,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const SELECT_BOOKING: &str = r#"
    SELECT id, user_id, bus_id, selected_seats, booking_status,
           passenger_details, contact_info, payment_ref, total_amount,
           coins_earned, coins_used, created_at, updated_at
    FROM bookings
"#;

async fn lock_booking_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> Result<Option<Booking>, StorageError> {
    let row = sqlx::query_as::<_, BookingRow>(&format!("{SELECT_BOOKING} WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx)?;

    row.map(Booking::try_from).transpose()
}

async fn delete_holder_leases(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    bus_id: i64,
    holder_id: &str,
) -> Result<Vec<SeatLease>, StorageError> {
    let rows = sqlx::query_as::<_, LeaseRow>(
        r#"
        DELETE FROM seat_leases
        WHERE bus_id = $1 AND holder_id = $2
        RETURNING bus_id, seat_number, holder_id, acquired_at, expires_at
        "#,
    )
    .bind(bus_id)
    .bind(holder_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(map_sqlx)?;

    Ok(rows.into_iter().map(SeatLease::from).collect())
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_pending(&self, new: &NewBooking) -> Result<PendingOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Same per-bus serialization point as the claim path, so the booking
        // row cannot race another booking or claim for these seats.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(new.bus_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let taken = booked_conflicts(&mut tx, new.bus_id, &new.selected_seats).await?;
        if !taken.is_empty() {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(PendingOutcome::SeatsTaken(taken));
        }

        let held = sqlx::query_scalar::<_, String>(
            r#"
            SELECT seat_number FROM seat_leases
            WHERE bus_id = $1 AND seat_number = ANY($2) AND holder_id = $3 AND expires_at > $4
            "#,
        )
        .bind(new.bus_id)
        .bind(&new.selected_seats)
        .bind(&new.user_id)
        .bind(Utc::now())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let missing: Vec<String> = new
            .selected_seats
            .iter()
            .filter(|s| !held.contains(s))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(PendingOutcome::LeaseMissing(missing));
        }

        let id = Uuid::new_v4();
        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            INSERT INTO bookings
                (id, user_id, bus_id, selected_seats, booking_status,
                 passenger_details, contact_info, total_amount, coins_earned, coins_used)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, 0, $8)
            RETURNING id, user_id, bus_id, selected_seats, booking_status,
                      passenger_details, contact_info, payment_ref, total_amount,
                      coins_earned, coins_used, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&new.user_id)
        .bind(new.bus_id)
        .bind(&new.selected_seats)
        .bind(&new.passenger_details)
        .bind(&new.contact_info)
        .bind(new.total_amount)
        .bind(new.coins_used)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(PendingOutcome::Created(Booking::try_from(row)?))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StorageError> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("{SELECT_BOOKING} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.map(Booking::try_from).transpose()
    }

    async fn confirm(
        &self,
        id: Uuid,
        payment_ref: &str,
        reward_coins: i64,
    ) -> Result<ConfirmStep, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let booking = match lock_booking_row(&mut tx, id).await? {
            None => return Ok(ConfirmStep::NotFound),
            Some(b) => b,
        };
        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Confirmed => return Ok(ConfirmStep::AlreadyConfirmed(booking)),
            other => return Ok(ConfirmStep::NotPending(other)),
        }

        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET booking_status = 'confirmed', payment_ref = $2, coins_earned = $3, updated_at = $4
            WHERE id = $1
            RETURNING id, user_id, bus_id, selected_seats, booking_status,
                      passenger_details, contact_info, payment_ref, total_amount,
                      coins_earned, coins_used, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(payment_ref)
        .bind(reward_coins)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let confirmed = Booking::try_from(row)?;

        if reward_coins > 0 {
            bump_wallet(&mut tx, &confirmed.user_id, reward_coins).await?;
            insert_coin_entry(
                &mut tx,
                &confirmed.user_id,
                reward_coins,
                CoinKind::Earned,
                Some(id),
                "booking reward",
            )
            .await?;
        }

        let released = delete_holder_leases(&mut tx, confirmed.bus_id, &confirmed.user_id).await?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(ConfirmStep::Confirmed {
            booking: confirmed,
            released,
        })
    }

    async fn cancel(&self, id: Uuid) -> Result<CancelStep, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let booking = match lock_booking_row(&mut tx, id).await? {
            None => return Ok(CancelStep::NotFound),
            Some(b) => b,
        };
        if booking.status != BookingStatus::Pending {
            return Ok(CancelStep::NotPending(booking.status));
        }

        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET booking_status = 'cancelled', updated_at = $2
            WHERE id = $1
            RETURNING id, user_id, bus_id, selected_seats, booking_status,
                      passenger_details, contact_info, payment_ref, total_amount,
                      coins_earned, coins_used, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let cancelled = Booking::try_from(row)?;

        let released = delete_holder_leases(&mut tx, cancelled.bus_id, &cancelled.user_id).await?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(CancelStep::Cancelled {
            booking: cancelled,
            released,
        })
    }

    async fn refund(&self, id: Uuid) -> Result<RefundStep, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let booking = match lock_booking_row(&mut tx, id).await? {
            None => return Ok(RefundStep::NotFound),
            Some(b) => b,
        };
        if booking.status != BookingStatus::Confirmed {
            return Ok(RefundStep::NotConfirmed(booking.status));
        }

        let row = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET booking_status = 'refunded', updated_at = $2
            WHERE id = $1
            RETURNING id, user_id, bus_id, selected_seats, booking_status,
                      passenger_details, contact_info, payment_ref, total_amount,
                      coins_earned, coins_used, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        let refunded = Booking::try_from(row)?;

        // Claw the reward back only while the wallet still covers it; the
        // balance must never go negative.
        let mut coins_debited = 0;
        if refunded.coins_earned > 0 {
            if let Some(_balance) =
                adjust_wallet_guarded(&mut tx, &refunded.user_id, refunded.coins_earned).await?
            {
                insert_coin_entry(
                    &mut tx,
                    &refunded.user_id,
                    -refunded.coins_earned,
                    CoinKind::Used,
                    Some(id),
                    "booking refund clawback",
                )
                .await?;
                coins_debited = refunded.coins_earned;
            }
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(RefundStep::Refunded {
            booking: refunded,
            coins_debited,
        })
    }

    async fn seats_taken(&self, bus_id: i64) -> Result<Vec<String>, StorageError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT s.seat
            FROM bookings b
            CROSS JOIN LATERAL unnest(b.selected_seats) AS s(seat)
            WHERE b.bus_id = $1 AND b.booking_status IN ('pending', 'confirmed')
            "#,
        )
        .bind(bus_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn cancel_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(Booking, Vec<SeatLease>)>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let rows = sqlx::query_as::<_, BookingRow>(
            r#"
            UPDATE bookings
            SET booking_status = 'cancelled', updated_at = $2
            WHERE booking_status = 'pending' AND created_at <= $1
            RETURNING id, user_id, bus_id, selected_seats, booking_status,
                      passenger_details, contact_info, payment_ref, total_amount,
                      coins_earned, coins_used, created_at, updated_at
            "#,
        )
        .bind(cutoff)
        .bind(Utc::now())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let mut cancelled = Vec::with_capacity(rows.len());
        for row in rows {
            let booking = Booking::try_from(row)?;
            let released = delete_holder_leases(&mut tx, booking.bus_id, &booking.user_id).await?;
            cancelled.push((booking, released));
        }

        tx.commit().await.map_err(map_sqlx)?;
        Ok(cancelled)
    }

    async fn bus_fare(&self, bus_id: i64) -> Result<Option<i64>, StorageError> {
        sqlx::query_scalar::<_, i64>("SELECT price FROM buses WHERE id = $1")
            .bind(bus_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }
}
