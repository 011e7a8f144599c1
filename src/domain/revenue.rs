use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Amount, OrderId, ServiceId, UserId};

pub const MIN_REPORT_YEAR: i32 = 1900;
pub const MAX_REPORT_YEAR: i32 = 9999;

/// Settled revenue for one confirmed order. Written once per confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueRecord {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub order_id: OrderId,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
}

/// Revenue summed for one service over a report period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyReportRow {
    pub service_id: ServiceId,
    pub total: Amount,
}

/// A calendar month in UTC, as the half-open range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub year: i32,
    pub month: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(MIN_REPORT_YEAR..=MAX_REPORT_YEAR).contains(&year) {
            return Err(PeriodError::YearOutOfRange(year));
        }
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or(PeriodError::MonthOutOfRange(month))?;
        let next = first
            .checked_add_months(Months::new(1))
            .ok_or(PeriodError::YearOutOfRange(year))?;

        Ok(Self {
            year,
            month,
            start: first.and_time(NaiveTime::default()).and_utc(),
            end: next.and_time(NaiveTime::default()).and_utc(),
        })
    }

    /// Last instant inside the period at the store's microsecond resolution.
    /// Queries bound on this inclusively, since `end` of December 9999 has
    /// no four-digit year.
    pub fn last_instant(&self) -> DateTime<Utc> {
        self.end - Duration::microseconds(1)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    /// Example: "2024-03"
    pub fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    YearOutOfRange(i32),
    MonthOutOfRange(u32),
}

impl std::fmt::Display for PeriodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodError::YearOutOfRange(year) => write!(
                f,
                "year {} is outside {}..={}",
                year, MIN_REPORT_YEAR, MAX_REPORT_YEAR
            ),
            PeriodError::MonthOutOfRange(month) => {
                write!(f, "month {} is outside 1..=12", month)
            }
        }
    }
}

impl std::error::Error for PeriodError {}
