use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Amount;

/// Accounts are keyed by the caller's user identifier.
pub type UserId = i64;

/// Per-user balance record.
///
/// `balance` is what the user can spend right now: funds held by active
/// reservations have already been taken out of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Amount::zero(),
            created_at,
            updated_at: created_at,
        }
    }
}
