// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use escrow_ledger::application::{AccountingEngine, DepositRequest};
use escrow_ledger::domain::{Amount, FixedClock, UserId};
use escrow_ledger::storage::{Database, StoreConfig};
use sqlx::SqlitePool;
use tempfile::TempDir;

/// An engine over a temporary database, driven by a clock the test controls.
pub struct TestLedger {
    pub engine: AccountingEngine,
    pub clock: Arc<FixedClock>,
    _temp: TempDir,
}

/// Helper to create a test engine with a temporary database.
/// The clock starts at 2024-03-15 12:00:00 UTC.
pub async fn test_ledger() -> Result<TestLedger> {
    let temp_dir = TempDir::new()?;
    let config = StoreConfig::for_path(temp_dir.path().join("test.db"))
        .with_busy_timeout(Duration::from_secs(30));
    let db = Database::init(&config).await?;

    let clock = Arc::new(FixedClock::new(at(2024, 3, 15, 12, 0, 0)));
    let engine = AccountingEngine::with_clock(db, clock.clone());

    Ok(TestLedger {
        engine,
        clock,
        _temp: temp_dir,
    })
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec).unwrap()
}

/// Helper to parse an amount literal such as "40.00"
pub fn amount(s: &str) -> Amount {
    s.parse().unwrap()
}

/// Deposit into an account, opening it if needed.
pub async fn fund(engine: &AccountingEngine, user_id: UserId, value: &str) -> Result<()> {
    engine.deposit(DepositRequest::new(user_id, value)).await?;
    Ok(())
}

/// Row counts across the stores, used to assert that a rejected operation
/// wrote nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub accounts: i64,
    pub reservations: i64,
    pub transactions: i64,
    pub revenue_records: i64,
}

pub async fn store_counts(engine: &AccountingEngine) -> Result<StoreCounts> {
    let pool = engine.database().pool();
    Ok(StoreCounts {
        accounts: count_rows(pool, "accounts").await?,
        reservations: count_rows(pool, "reservations").await?,
        transactions: count_rows(pool, "transactions").await?,
        revenue_records: count_rows(pool, "revenue_records").await?,
    })
}

async fn count_rows(pool: &SqlitePool, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}
