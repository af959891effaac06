use std::sync::Arc;

use uuid::Uuid;

use yatri_domain::{CoinEntry, CoinLedger, DebitOutcome, EngineError};

/// Thin facade over the coin ledger. Entry append and balance adjustment
/// are one unit of work inside the store; this layer only maps the guarded
/// debit rejection into the typed error.
pub struct CoinService {
    ledger: Arc<dyn CoinLedger>,
}

impl CoinService {
    pub fn new(ledger: Arc<dyn CoinLedger>) -> Self {
        Self { ledger }
    }

    pub async fn credit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        reason: &str,
    ) -> Result<i64, EngineError> {
        Ok(self.ledger.credit(user_id, amount, booking_id, reason).await?)
    }

    pub async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        booking_id: Option<Uuid>,
        reason: &str,
    ) -> Result<i64, EngineError> {
        match self.ledger.debit(user_id, amount, booking_id, reason).await? {
            DebitOutcome::Applied(balance) => Ok(balance),
            DebitOutcome::Insufficient { balance } => Err(EngineError::InsufficientBalance {
                balance,
                requested: amount,
            }),
        }
    }

    pub async fn balance(&self, user_id: &str) -> Result<i64, EngineError> {
        Ok(self.ledger.balance(user_id).await?)
    }

    pub async fn entries(&self, user_id: &str) -> Result<Vec<CoinEntry>, EngineError> {
        Ok(self.ledger.entries(user_id).await?)
    }

    /// Checked invariant: the maintained balance always equals the signed
    /// sum of the user's ledger entries.
    pub async fn reconcile(&self, user_id: &str) -> Result<bool, EngineError> {
        Ok(self.ledger.reconcile(user_id).await?)
    }
}
