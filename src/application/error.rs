use thiserror::Error;

use crate::domain::{Amount, AmountError, OrderId, PeriodError, ServiceId, UserId};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Account not found: {0}")]
    NotFound(UserId),

    #[error("Insufficient funds for user {user_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Amount,
        required: Amount,
    },

    #[error(
        "No reservation for user {user_id}, service {service_id}, order {order_id} with amount {amount}"
    )]
    ReservationNotFound {
        user_id: UserId,
        service_id: ServiceId,
        order_id: OrderId,
        amount: Amount,
    },

    #[error("User {0} cannot transfer funds to itself")]
    SelfTransfer(UserId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{operation} failed: {source:#}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Coarse error classes a presentation layer maps to its own codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidAmount,
    NotFound,
    InsufficientFunds,
    ReservationNotFound,
    SelfTransfer,
    InvalidArgument,
    Persistence,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_) => ErrorKind::InvalidAmount,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::ReservationNotFound { .. } => ErrorKind::ReservationNotFound,
            LedgerError::SelfTransfer(_) => ErrorKind::SelfTransfer,
            LedgerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LedgerError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    pub(crate) fn persistence(operation: &'static str, source: anyhow::Error) -> Self {
        LedgerError::Persistence { operation, source }
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        LedgerError::InvalidAmount(err.to_string())
    }
}

impl From<PeriodError> for LedgerError {
    fn from(err: PeriodError) -> Self {
        LedgerError::InvalidArgument(err.to_string())
    }
}

/// Tags a store failure with the engine operation it interrupted.
pub(crate) trait OperationContext<T> {
    fn during(self, operation: &'static str) -> Result<T, LedgerError>;
}

impl<T> OperationContext<T> for anyhow::Result<T> {
    fn during(self, operation: &'static str) -> Result<T, LedgerError> {
        self.map_err(|source| LedgerError::persistence(operation, source))
    }
}
