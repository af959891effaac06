use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinKind {
    Earned,
    Used,
}

impl CoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinKind::Earned => "earned",
            CoinKind::Used => "used",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "earned" => Some(CoinKind::Earned),
            "used" => Some(CoinKind::Used),
            _ => None,
        }
    }
}

/// One append-only ledger row. `amount` is signed: positive for `Earned`,
/// negative for `Used`, so a user's balance is the plain sum of their
/// entries. The maintained wallet balance must always reconcile with that
/// sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinEntry {
    pub id: Uuid,
    pub user_id: String,
    pub amount: i64,
    pub kind: CoinKind,
    pub booking_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
