use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use yatri_domain::{CoinEntry, CoinKind, CoinLedger, DebitOutcome, StorageError};

use crate::database::{map_sqlx, PgStore};

#[derive(sqlx::FromRow)]
struct CoinRow {
    id: Uuid,
    user_id: String,
    amount: i64,
    kind: String,
    booking_id: Option<Uuid>,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CoinRow> for CoinEntry {
    type Error = StorageError;

    fn try_from(r: CoinRow) -> Result<Self, StorageError> {
        let kind = CoinKind::parse(&r.kind)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown coin kind {:?}", r.kind)))?;
        Ok(CoinEntry {
            id: r.id,
            user_id: r.user_id,
            amount: r.amount,
            kind,
            booking_id: r.booking_id,
            description: r.description,
            created_at: r.created_at,
        })
    }
}

/// Add `delta` (positive) to a wallet, creating it on first credit. Returns
/// the new balance. Must run inside the caller's transaction so the entry
/// append and the balance bump are durable together.
pub(crate) async fn bump_wallet(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &str,
    delta: i64,
) -> Result<i64, StorageError> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO wallets (user_id, coins) VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET coins = wallets.coins + EXCLUDED.coins
        RETURNING coins
        "#,
    )
    .bind(user_id)
    .bind(delta)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_sqlx)
}

/// Subtract `amount` only if the wallet covers it. Returns the new balance,
/// or `None` when the guard rejected the debit. The row lock taken by the
/// UPDATE closes the lost-update window between concurrent writers.
pub(crate) async fn adjust_wallet_guarded(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &str,
    amount: i64,
) -> Result<Option<i64>, StorageError> {
    sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE wallets SET coins = coins - $2
        WHERE user_id = $1 AND coins >= $2
        RETURNING coins
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_sqlx)
}

pub(crate) async fn insert_coin_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &str,
    signed_amount: i64,
    kind: CoinKind,
    booking_id: Option<Uuid>,
    description: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO coin_transactions (id, user_id, amount, kind, booking_id, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(signed_amount)
    .bind(kind.as_str())
    .bind(booking_id)
    .bind(description)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx)?;
    Ok(())
}

#[async_trait]
impl CoinLedger for PgStore {
    async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        description: &str,
    ) -> Result<i64, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        let balance = bump_wallet(&mut tx, user_id, amount).await?;
        insert_coin_entry(&mut tx, user_id, amount, CoinKind::Earned, booking_id, description)
            .await?;
        tx.commit().await.map_err(map_sqlx)?;
        Ok(balance)
    }

    async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        description: &str,
    ) -> Result<DebitOutcome, StorageError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        match adjust_wallet_guarded(&mut tx, user_id, amount).await? {
            Some(balance) => {
                insert_coin_entry(&mut tx, user_id, -amount, CoinKind::Used, booking_id, description)
                    .await?;
                tx.commit().await.map_err(map_sqlx)?;
                Ok(DebitOutcome::Applied(balance))
            }
            None => {
                tx.rollback().await.map_err(map_sqlx)?;
                let balance = self.balance(user_id).await?;
                Ok(DebitOutcome::Insufficient { balance })
            }
        }
    }

    async fn balance(&self, user_id: &str) -> Result<i64, StorageError> {
        let coins = sqlx::query_scalar::<_, i64>("SELECT coins FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(coins.unwrap_or(0))
    }

    async fn entries(&self, user_id: &str) -> Result<Vec<CoinEntry>, StorageError> {
        let rows = sqlx::query_as::<_, CoinRow>(
            r#"
            SELECT id, user_id, amount, kind, booking_id, description, created_at
            FROM coin_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(CoinEntry::try_from).collect()
    }

    async fn reconcile(&self, user_id: &str) -> Result<bool, StorageError> {
        let (balance, total) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COALESCE((SELECT coins FROM wallets WHERE user_id = $1), 0),
                   -- SUM over BIGINT yields NUMERIC; cast back for the i64 decode
                   COALESCE((SELECT SUM(amount) FROM coin_transactions WHERE user_id = $1), 0)::BIGINT
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(balance == total)
    }
}
