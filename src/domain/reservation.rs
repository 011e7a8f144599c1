use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, UserId};

pub type ServiceId = i64;
pub type OrderId = i64;
pub type ReservationId = Uuid;

/// Natural key used to find a reservation without knowing its generated id.
///
/// Two outstanding reservations sharing the whole key are indistinguishable;
/// the store settles the oldest one first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationKey {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
    pub amount: Amount,
}

/// Funds moved out of an account's balance and held for a pending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
    /// Always positive
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(key: ReservationKey, created_at: DateTime<Utc>) -> Self {
        assert!(key.amount.is_positive(), "Reservation amount must be positive");
        Self {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            service_id: key.service_id,
            order_id: key.order_id,
            amount: key.amount,
            created_at,
        }
    }

    pub fn key(&self) -> ReservationKey {
        ReservationKey {
            user_id: self.user_id,
            service_id: self.service_id,
            order_id: self.order_id,
            amount: self.amount,
        }
    }
}
