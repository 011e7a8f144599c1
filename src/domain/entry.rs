use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, OrderId, ServiceId, UserId};

pub type EntryId = Uuid;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Upper bound on a single page of ledger entries.
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Money entering an account from outside the ledger
    Deposit,
    /// Funds moved from the balance into escrow
    Reserve,
    /// Escrowed funds recognized as revenue
    Confirm,
    /// Money moved between two accounts
    Transfer,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Deposit => "deposit",
            EntryType::Reserve => "reserve",
            EntryType::Confirm => "confirm",
            EntryType::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(EntryType::Deposit),
            "reserve" => Some(EntryType::Reserve),
            "confirm" => Some(EntryType::Confirm),
            "transfer" => Some(EntryType::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable record of a balance-affecting event.
/// Entries are never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Store-assigned, strictly increasing append order
    pub sequence: i64,
    /// The account the event is attributed to
    pub user_id: UserId,
    pub service_id: Option<ServiceId>,
    pub order_id: Option<OrderId>,
    /// Receiving account of a transfer
    pub counterparty_id: Option<UserId>,
    /// Signed amount
    pub amount: Amount,
    pub entry_type: EntryType,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a new entry. Sequence number must be assigned by the store.
    pub fn new(
        user_id: UserId,
        entry_type: EntryType,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            user_id,
            service_id: None,
            order_id: None,
            counterparty_id: None,
            amount,
            entry_type,
            description: entry_type.as_str().to_string(),
            created_at,
        }
    }

    pub fn with_order(mut self, service_id: ServiceId, order_id: OrderId) -> Self {
        self.service_id = Some(service_id);
        self.order_id = Some(order_id);
        self
    }

    pub fn with_counterparty(mut self, user_id: UserId) -> Self {
        self.counterparty_id = Some(user_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Columns ledger pages may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Amount,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Amount => "amount",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "created_at" => Some(SortField::CreatedAt),
            "amount" => Some(SortField::Amount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// A validated page request over one user's ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryQuery {
    /// 1-based
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl EntryQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

impl Default for EntryQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}
