use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use yatri_domain::{ClaimOutcome, LeaseStore, SeatLease, StorageError};

use crate::database::{map_sqlx, PgStore};

#[derive(sqlx::FromRow)]
pub(crate) struct LeaseRow {
    pub bus_id: i64,
    pub seat_number: String,
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<LeaseRow> for SeatLease {
    fn from(r: LeaseRow) -> Self {
        SeatLease {
            bus_id: r.bus_id,
            seat_number: r.seat_number,
            holder_id: r.holder_id,
            acquired_at: r.acquired_at,
            expires_at: r.expires_at,
        }
    }
}

/// Seats among `seats` already covered by a pending/confirmed booking on the
/// bus. Shared by the claim and pending-booking paths; must run inside their
/// transaction.
pub(crate) async fn booked_conflicts(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    bus_id: i64,
    seats: &[String],
) -> Result<Vec<String>, StorageError> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT DISTINCT s.seat
        FROM bookings b
        CROSS JOIN LATERAL unnest(b.selected_seats) AS s(seat)
        WHERE b.bus_id = $1
          AND b.booking_status IN ('pending', 'confirmed')
          AND s.seat = ANY($2)
        "#,
    )
    .bind(bus_id)
    .bind(seats)
    .fetch_all(&mut **tx)
    .await
    .map_err(map_sqlx)
}

#[async_trait]
impl LeaseStore for PgStore {
    async fn claim_seats(
        &self,
        bus_id: i64,
        seats: &[String],
        holder_id: &str,
        ttl: Duration,
    ) -> Result<ClaimOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // Serialize claims per bus so two overlapping claims resolve to
        // exactly one winner.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(bus_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let now = Utc::now();
        let mut conflicts = booked_conflicts(&mut tx, bus_id, seats).await?;

        let lease_conflicts = sqlx::query_scalar::<_, String>(
            r#"
            SELECT seat_number FROM seat_leases
            WHERE bus_id = $1
              AND seat_number = ANY($2)
              AND holder_id <> $3
              AND expires_at > $4
            "#,
        )
        .bind(bus_id)
        .bind(seats)
        .bind(holder_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        conflicts.extend(lease_conflicts);
        if !conflicts.is_empty() {
            conflicts.sort();
            conflicts.dedup();
            tx.rollback().await.map_err(map_sqlx)?;
            return Ok(ClaimOutcome::Conflict(conflicts));
        }

        let expires_at = now + ttl;
        // Conflict checks ran under the advisory lock, so the upsert can
        // overwrite expired rows and renew the holder's own leases.
        sqlx::query(
            r#"
            INSERT INTO seat_leases (bus_id, seat_number, holder_id, acquired_at, expires_at)
            SELECT $1, s, $3, $4, $5 FROM unnest($2::text[]) AS s
            ON CONFLICT (bus_id, seat_number) DO UPDATE
                SET holder_id = EXCLUDED.holder_id,
                    acquired_at = EXCLUDED.acquired_at,
                    expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(bus_id)
        .bind(seats)
        .bind(holder_id)
        .bind(now)
        .bind(expires_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;

        let leases = seats
            .iter()
            .map(|seat| SeatLease {
                bus_id,
                seat_number: seat.clone(),
                holder_id: holder_id.to_string(),
                acquired_at: now,
                expires_at,
            })
            .collect();

        Ok(ClaimOutcome::Granted(leases))
    }

    async fn release_holder(
        &self,
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
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(SeatLease::from).collect())
    }

    async fn leases_for_bus(&self, bus_id: i64) -> Result<Vec<SeatLease>, StorageError> {
        let rows = sqlx::query_as::<_, LeaseRow>(
            r#"
            SELECT bus_id, seat_number, holder_id, acquired_at, expires_at
            FROM seat_leases
            WHERE bus_id = $1 AND expires_at > $2
            "#,
        )
        .bind(bus_id)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(SeatLease::from).collect())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<Vec<SeatLease>, StorageError> {
        let rows = sqlx::query_as::<_, LeaseRow>(
            r#"
            DELETE FROM seat_leases
            WHERE expires_at <= $1
            RETURNING bus_id, seat_number, holder_id, acquired_at, expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows.into_iter().map(SeatLease::from).collect())
    }
}
