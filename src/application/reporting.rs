use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Amount, MonthlyReportRow, ReportPeriod};
use crate::storage::{Database, RevenueLedger};

use super::{LedgerError, OperationContext};

/// Per-service revenue for one calendar month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyReport {
    pub period: ReportPeriod,
    /// One row per service with confirmed revenue, ordered by service id
    pub rows: Vec<MonthlyReportRow>,
    pub total: Amount,
}

impl MonthlyReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render as a plain-text table with a trailing total line.
    pub fn to_table(&self) -> String {
        let mut out = format!("Revenue report for {}\n", self.period.label());
        out.push_str(&format!("{:<12} {:>18}\n", "SERVICE", "REVENUE"));
        out.push_str(&format!("{}\n", "-".repeat(31)));
        for row in &self.rows {
            out.push_str(&format!("{:<12} {:>18}\n", row.service_id, row.total.to_string()));
        }
        out.push_str(&format!("{}\n", "-".repeat(31)));
        out.push_str(&format!("{:<12} {:>18}\n", "TOTAL", self.total.to_string()));
        out
    }
}

/// Builds monthly revenue summaries from the revenue ledger.
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    db: Database,
}

impl ReportGenerator {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Aggregate confirmed revenue for `[year-month-01, next month)`.
    /// A month without revenue yields an empty report.
    pub async fn monthly(&self, year: i32, month: u32) -> Result<MonthlyReport, LedgerError> {
        let period = ReportPeriod::new(year, month)?;

        let mut snapshot = self.db.read().await.during("monthly report")?;
        let rows = RevenueLedger::aggregate_for_month(&mut snapshot, &period)
            .await
            .during("monthly report")?;
        let total: Amount = rows.iter().map(|row| row.total).sum();

        info!(period = %period.label(), services = rows.len(), %total, "Built monthly report");
        Ok(MonthlyReport { period, rows, total })
    }
}
