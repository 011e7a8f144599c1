use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::domain::{
    Amount, Clock, DEFAULT_PAGE_LIMIT, EntryId, EntryQuery, EntryType, LedgerEntry,
    MAX_PAGE_LIMIT, OrderId, Reservation, ReservationId, ReservationKey, RevenueRecord, ServiceId,
    SortField, SortOrder, SystemClock, UserId,
};
use crate::storage::{
    AccountStore, Database, ReservationStore, RevenueLedger, StoreConfig, TransactionLedger,
    UnitOfWork,
};

use super::{LedgerError, MonthlyReport, OperationContext, ReportGenerator};

pub const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub user_id: UserId,
    /// Decimal text as supplied by the caller
    pub amount: Option<String>,
}

impl DepositRequest {
    pub fn new(user_id: UserId, amount: impl Into<String>) -> Self {
        Self {
            user_id,
            amount: Some(amount.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
    pub amount: Option<String>,
}

impl ReserveRequest {
    pub fn new(
        user_id: UserId,
        service_id: ServiceId,
        order_id: OrderId,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            service_id,
            order_id,
            amount: Some(amount.into()),
        }
    }
}

/// Settles the reservation matching all four fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
    pub amount: Option<String>,
}

impl ConfirmRequest {
    pub fn new(
        user_id: UserId,
        service_id: ServiceId,
        order_id: OrderId,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            service_id,
            order_id,
            amount: Some(amount.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: Option<String>,
}

impl TransferRequest {
    pub fn new(from_user_id: UserId, to_user_id: UserId, amount: impl Into<String>) -> Self {
        Self {
            from_user_id,
            to_user_id,
            amount: Some(amount.into()),
        }
    }
}

/// Unset fields take their defaults; set fields must be valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListTransactionsRequest {
    pub user_id: UserId,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl ListTransactionsRequest {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn sort_order(mut self, sort_order: impl Into<String>) -> Self {
        self.sort_order = Some(sort_order.into());
        self
    }

    fn to_query(&self) -> Result<EntryQuery, LedgerError> {
        let page = match self.page {
            None => 1,
            Some(page) => u32::try_from(page)
                .ok()
                .filter(|page| *page >= 1)
                .ok_or_else(|| {
                    LedgerError::InvalidArgument(format!("page must be at least 1, got {}", page))
                })?,
        };
        let limit = match self.limit {
            None => DEFAULT_PAGE_LIMIT,
            Some(limit) => u32::try_from(limit)
                .ok()
                .filter(|limit| (1..=MAX_PAGE_LIMIT).contains(limit))
                .ok_or_else(|| {
                    LedgerError::InvalidArgument(format!(
                        "limit must be between 1 and {}, got {}",
                        MAX_PAGE_LIMIT, limit
                    ))
                })?,
        };
        let sort_by = match self.sort_by.as_deref() {
            None => SortField::default(),
            Some(raw) => SortField::from_str(raw).ok_or_else(|| {
                LedgerError::InvalidArgument(format!(
                    "sort_by must be 'created_at' or 'amount', got '{}'",
                    raw
                ))
            })?,
        };
        let sort_order = match self.sort_order.as_deref() {
            None => SortOrder::default(),
            Some(raw) => SortOrder::from_str(raw).ok_or_else(|| {
                LedgerError::InvalidArgument(format!(
                    "sort_order must be 'asc' or 'desc', got '{}'",
                    raw
                ))
            })?,
        };

        Ok(EntryQuery {
            page,
            limit,
            sort_by,
            sort_order,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositOutcome {
    pub user_id: UserId,
    pub balance: Amount,
    pub entry_id: EntryId,
    pub status: String,
    pub message: String,
}

/// Available balance plus what is currently held in escrow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    pub user_id: UserId,
    pub balance: Amount,
    pub reserved: Amount,
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveOutcome {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
    pub balance: Amount,
    /// Total now held in escrow for the user, this reservation included
    pub reserved: Amount,
    pub reservation_id: ReservationId,
    pub entry_id: EntryId,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmOutcome {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
    pub amount: Amount,
    pub entry_id: EntryId,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: Amount,
    pub from_balance: Amount,
    pub to_balance: Amount,
    pub entry_id: EntryId,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionPage {
    pub user_id: UserId,
    pub entries: Vec<LedgerEntry>,
    /// Entries across all pages
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

/// Runs the ledger's operations against the store.
///
/// Every state-changing operation validates its input before touching the
/// store, then runs in a single [`UnitOfWork`]. Any failure after that point
/// rolls the whole unit back, so callers observe either every effect of an
/// operation or none of them.
#[derive(Clone)]
pub struct AccountingEngine {
    db: Database,
    clock: Arc<dyn Clock>,
    reports: ReportGenerator,
}

impl AccountingEngine {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Database, clock: Arc<dyn Clock>) -> Self {
        let reports = ReportGenerator::new(db.clone());
        Self { db, clock, reports }
    }

    /// Connect to the store, apply migrations and build an engine.
    pub async fn init(config: &StoreConfig) -> Result<Self, LedgerError> {
        let db = Database::init(config).await.during("init")?;
        Ok(Self::new(db))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn reports(&self) -> &ReportGenerator {
        &self.reports
    }

    /// Credit an account, creating it on first deposit.
    #[instrument(name = "ledger.deposit", skip_all, fields(user_id = request.user_id))]
    pub async fn deposit(&self, request: DepositRequest) -> Result<DepositOutcome, LedgerError> {
        const OP: &str = "deposit";
        let amount = Amount::parse_positive(request.amount.as_deref())?;

        let mut uow = self.db.begin_immediate().await.during(OP)?;
        let result = self.deposit_in(&mut uow, request.user_id, amount).await;
        let outcome = settle(OP, uow, result).await?;

        info!(user_id = outcome.user_id, %amount, balance = %outcome.balance, entry_id = %outcome.entry_id, "Deposited funds");
        Ok(outcome)
    }

    async fn deposit_in(
        &self,
        uow: &mut UnitOfWork,
        user_id: UserId,
        amount: Amount,
    ) -> Result<DepositOutcome, LedgerError> {
        const OP: &str = "deposit";
        let now = self.clock.now();

        let current = match AccountStore::get_balance_for_update(uow, user_id)
            .await
            .during(OP)?
        {
            Some(balance) => balance,
            None => {
                AccountStore::create(uow, user_id, now).await.during(OP)?;
                info!(user_id, "Opened account on first deposit");
                Amount::zero()
            }
        };
        if (current + amount).to_cents().is_err() {
            return Err(LedgerError::InvalidAmount(format!(
                "depositing {} would overflow the balance of user {}",
                amount, user_id
            )));
        }

        let mut entry = LedgerEntry::new(user_id, EntryType::Deposit, amount, now);
        let entry_id = TransactionLedger::append(uow, &mut entry).await.during(OP)?;

        let balance = AccountStore::apply_delta(uow, user_id, amount, now)
            .await
            .during(OP)?
            .ok_or(LedgerError::NotFound(user_id))?;

        Ok(DepositOutcome {
            user_id,
            balance,
            entry_id,
            status: STATUS_SUCCESS.to_string(),
            message: "funds deposited successfully".to_string(),
        })
    }

    /// Available balance and escrowed total, read from one snapshot.
    #[instrument(name = "ledger.get_balance", skip_all, fields(user_id = user_id))]
    pub async fn get_balance(&self, user_id: UserId) -> Result<BalanceView, LedgerError> {
        const OP: &str = "get balance";

        let mut snapshot = self.db.read().await.during(OP)?;
        let balance = AccountStore::get_balance(&mut snapshot, user_id)
            .await
            .during(OP)?
            .ok_or(LedgerError::NotFound(user_id))?;
        let reserved = ReservationStore::sum_active_by_user(&mut snapshot, user_id)
            .await
            .during(OP)?;
        let reservations = ReservationStore::list_by_user(&mut snapshot, user_id)
            .await
            .during(OP)?;

        Ok(BalanceView {
            user_id,
            balance,
            reserved,
            reservations,
        })
    }

    /// Move funds from the balance into escrow for an order.
    #[instrument(
        name = "ledger.reserve",
        skip_all,
        fields(user_id = request.user_id, service_id = request.service_id, order_id = request.order_id)
    )]
    pub async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome, LedgerError> {
        const OP: &str = "reserve";
        let amount = Amount::parse_positive(request.amount.as_deref())?;
        let key = ReservationKey {
            user_id: request.user_id,
            service_id: request.service_id,
            order_id: request.order_id,
            amount,
        };

        let mut uow = self.db.begin_immediate().await.during(OP)?;
        let result = self.reserve_in(&mut uow, key).await;
        let outcome = settle(OP, uow, result).await?;

        info!(
            user_id = outcome.user_id,
            %amount,
            balance = %outcome.balance,
            reservation_id = %outcome.reservation_id,
            "Reserved funds"
        );
        Ok(outcome)
    }

    async fn reserve_in(
        &self,
        uow: &mut UnitOfWork,
        key: ReservationKey,
    ) -> Result<ReserveOutcome, LedgerError> {
        const OP: &str = "reserve";
        let now = self.clock.now();
        let user_id = key.user_id;

        let balance = AccountStore::get_balance_for_update(uow, user_id)
            .await
            .during(OP)?
            .ok_or(LedgerError::NotFound(user_id))?;
        if balance < key.amount {
            warn!(user_id, %balance, required = %key.amount, "Rejected reservation: insufficient funds");
            return Err(LedgerError::InsufficientFunds {
                user_id,
                balance,
                required: key.amount,
            });
        }

        let reservation = Reservation::new(key, now);
        let reservation_id = ReservationStore::create(uow, &reservation).await.during(OP)?;

        let debited = match AccountStore::apply_delta(uow, user_id, -key.amount, now).await {
            Ok(Some(balance)) => Ok(balance),
            Ok(None) => Err(LedgerError::NotFound(user_id)),
            Err(err) => Err(LedgerError::persistence(OP, err)),
        };
        let balance = match debited {
            Ok(balance) => balance,
            Err(err) => {
                // A reservation must never outlive a failed debit
                warn!(%reservation_id, "Balance debit failed; removing reservation");
                if let Err(cleanup) = ReservationStore::delete_by_id(uow, reservation_id).await {
                    error!(%reservation_id, error = %format!("{cleanup:#}"), "Failed to remove reservation after debit failure");
                }
                return Err(err);
            }
        };

        let mut entry = LedgerEntry::new(user_id, EntryType::Reserve, -key.amount, now)
            .with_order(key.service_id, key.order_id)
            .with_description(format!(
                "reserve for service {} order {}",
                key.service_id, key.order_id
            ));
        let entry_id = TransactionLedger::append(uow, &mut entry).await.during(OP)?;

        let reserved = ReservationStore::sum_active_by_user(uow.conn(), user_id)
            .await
            .during(OP)?;

        Ok(ReserveOutcome {
            user_id,
            service_id: key.service_id,
            order_id: key.order_id,
            balance,
            reserved,
            reservation_id,
            entry_id,
            status: STATUS_SUCCESS.to_string(),
            message: "funds reserved successfully".to_string(),
        })
    }

    /// Settle a reservation as revenue.
    ///
    /// Not idempotent: once a reservation is confirmed it no longer exists,
    /// so repeating the call fails with [`LedgerError::ReservationNotFound`].
    #[instrument(
        name = "ledger.confirm",
        skip_all,
        fields(user_id = request.user_id, service_id = request.service_id, order_id = request.order_id)
    )]
    pub async fn confirm(&self, request: ConfirmRequest) -> Result<ConfirmOutcome, LedgerError> {
        const OP: &str = "confirm";
        let amount = Amount::parse_positive(request.amount.as_deref())?;
        let key = ReservationKey {
            user_id: request.user_id,
            service_id: request.service_id,
            order_id: request.order_id,
            amount,
        };

        let mut uow = self.db.begin_immediate().await.during(OP)?;
        let result = self.confirm_in(&mut uow, key).await;
        let outcome = settle(OP, uow, result).await?;

        info!(
            user_id = outcome.user_id,
            service_id = outcome.service_id,
            order_id = outcome.order_id,
            %amount,
            "Confirmed reservation"
        );
        Ok(outcome)
    }

    async fn confirm_in(
        &self,
        uow: &mut UnitOfWork,
        key: ReservationKey,
    ) -> Result<ConfirmOutcome, LedgerError> {
        const OP: &str = "confirm";
        let now = self.clock.now();
        let not_found = || LedgerError::ReservationNotFound {
            user_id: key.user_id,
            service_id: key.service_id,
            order_id: key.order_id,
            amount: key.amount,
        };

        if !ReservationStore::exists_by_key(uow.conn(), &key).await.during(OP)? {
            warn!(user_id = key.user_id, amount = %key.amount, "Rejected confirmation: no matching reservation");
            return Err(not_found());
        }
        if !ReservationStore::delete_by_key(uow, &key).await.during(OP)? {
            return Err(not_found());
        }

        let mut entry = LedgerEntry::new(key.user_id, EntryType::Confirm, -key.amount, now)
            .with_order(key.service_id, key.order_id)
            .with_description(format!(
                "confirm for service {} order {}",
                key.service_id, key.order_id
            ));
        let entry_id = TransactionLedger::append(uow, &mut entry).await.during(OP)?;

        let record = RevenueRecord {
            user_id: key.user_id,
            service_id: key.service_id,
            order_id: key.order_id,
            amount: key.amount,
            created_at: now,
        };
        RevenueLedger::append(uow, &record).await.during(OP)?;

        Ok(ConfirmOutcome {
            user_id: key.user_id,
            service_id: key.service_id,
            order_id: key.order_id,
            amount: key.amount,
            entry_id,
            status: STATUS_SUCCESS.to_string(),
            message: "reservation confirmed successfully".to_string(),
        })
    }

    /// Move funds between two existing accounts.
    #[instrument(
        name = "ledger.transfer",
        skip_all,
        fields(from_user_id = request.from_user_id, to_user_id = request.to_user_id)
    )]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome, LedgerError> {
        const OP: &str = "transfer";
        let amount = Amount::parse_positive(request.amount.as_deref())?;
        if request.from_user_id == request.to_user_id {
            return Err(LedgerError::SelfTransfer(request.from_user_id));
        }

        let mut uow = self.db.begin_immediate().await.during(OP)?;
        let result = self
            .transfer_in(&mut uow, request.from_user_id, request.to_user_id, amount)
            .await;
        let outcome = settle(OP, uow, result).await?;

        info!(
            from_user_id = outcome.from_user_id,
            to_user_id = outcome.to_user_id,
            %amount,
            entry_id = %outcome.entry_id,
            "Transferred funds"
        );
        Ok(outcome)
    }

    async fn transfer_in(
        &self,
        uow: &mut UnitOfWork,
        from_user_id: UserId,
        to_user_id: UserId,
        amount: Amount,
    ) -> Result<TransferOutcome, LedgerError> {
        const OP: &str = "transfer";
        let now = self.clock.now();

        // Accounts are always touched lowest user id first
        let ordered = if from_user_id < to_user_id {
            [from_user_id, to_user_id]
        } else {
            [to_user_id, from_user_id]
        };

        let mut sender_balance = Amount::zero();
        let mut receiver_balance = Amount::zero();
        for user_id in ordered {
            let balance = AccountStore::get_balance_for_update(uow, user_id)
                .await
                .during(OP)?
                .ok_or(LedgerError::NotFound(user_id))?;
            if user_id == from_user_id {
                sender_balance = balance;
            } else {
                receiver_balance = balance;
            }
        }
        if (receiver_balance + amount).to_cents().is_err() {
            return Err(LedgerError::InvalidAmount(format!(
                "transferring {} would overflow the balance of user {}",
                amount, to_user_id
            )));
        }
        if sender_balance < amount {
            warn!(user_id = from_user_id, balance = %sender_balance, required = %amount, "Rejected transfer: insufficient funds");
            return Err(LedgerError::InsufficientFunds {
                user_id: from_user_id,
                balance: sender_balance,
                required: amount,
            });
        }

        let mut from_balance = sender_balance;
        let mut to_balance = Amount::zero();
        for user_id in ordered {
            let delta = if user_id == from_user_id { -amount } else { amount };
            let balance = AccountStore::apply_delta(uow, user_id, delta, now)
                .await
                .during(OP)?
                .ok_or(LedgerError::NotFound(user_id))?;
            if user_id == from_user_id {
                from_balance = balance;
            } else {
                to_balance = balance;
            }
        }

        let mut entry = LedgerEntry::new(from_user_id, EntryType::Transfer, amount, now)
            .with_counterparty(to_user_id)
            .with_description(format!("transfer to user {}", to_user_id));
        let entry_id = TransactionLedger::append(uow, &mut entry).await.during(OP)?;

        Ok(TransferOutcome {
            from_user_id,
            to_user_id,
            amount,
            from_balance,
            to_balance,
            entry_id,
            status: STATUS_SUCCESS.to_string(),
            message: "funds transferred successfully".to_string(),
        })
    }

    /// One page of a user's ledger entries. A user without entries gets an
    /// empty page.
    #[instrument(name = "ledger.list_transactions", skip_all, fields(user_id = request.user_id))]
    pub async fn list_transactions(
        &self,
        request: ListTransactionsRequest,
    ) -> Result<TransactionPage, LedgerError> {
        const OP: &str = "list transactions";
        let query = request.to_query()?;

        let mut snapshot = self.db.read().await.during(OP)?;
        let (entries, total) = TransactionLedger::list(&mut snapshot, request.user_id, &query)
            .await
            .during(OP)?;

        Ok(TransactionPage {
            user_id: request.user_id,
            entries,
            total,
            page: query.page,
            limit: query.limit,
            total_pages: total.div_ceil(u64::from(query.limit)),
            sort_by: query.sort_by,
            sort_order: query.sort_order,
        })
    }

    /// Per-service revenue confirmed during the given calendar month.
    #[instrument(name = "ledger.monthly_report", skip_all, fields(year = year, month = month))]
    pub async fn monthly_report(&self, year: i32, month: u32) -> Result<MonthlyReport, LedgerError> {
        self.reports.monthly(year, month).await
    }
}

/// Commit the unit of work when the operation succeeded, otherwise roll it
/// back and return the operation's error.
async fn settle<T>(
    operation: &'static str,
    uow: UnitOfWork,
    result: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            uow.commit().await.during(operation)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = uow.rollback().await {
                error!(operation, error = %format!("{rollback:#}"), "Rollback failed");
            }
            Err(err)
        }
    }
}
