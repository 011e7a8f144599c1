use anyhow::Result;
use std::io::Write;

use crate::application::{
    AccountingEngine, ListTransactionsRequest, MonthlyReport, TransactionPage,
};

/// Exporter for converting ledger data to downloadable formats
pub struct Exporter<'a> {
    engine: &'a AccountingEngine,
}

impl<'a> Exporter<'a> {
    pub fn new(engine: &'a AccountingEngine) -> Self {
        Self { engine }
    }

    /// Export a monthly revenue report to CSV. Returns the number of
    /// service rows written.
    pub async fn export_report_csv<W: Write>(&self, year: i32, month: u32, writer: W) -> Result<usize> {
        let report = self.engine.monthly_report(year, month).await?;
        write_report_csv(&report, writer)
    }

    /// Export a monthly revenue report as pretty-printed JSON
    pub async fn export_report_json<W: Write>(
        &self,
        year: i32,
        month: u32,
        mut writer: W,
    ) -> Result<MonthlyReport> {
        let report = self.engine.monthly_report(year, month).await?;

        let json = serde_json::to_string_pretty(&report)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(report)
    }

    /// Export one page of a user's transactions to CSV
    pub async fn export_transactions_csv<W: Write>(
        &self,
        request: ListTransactionsRequest,
        writer: W,
    ) -> Result<usize> {
        let page = self.engine.list_transactions(request).await?;
        write_transactions_csv(&page, writer)
    }
}

/// Write `service_id,total_revenue` rows for a report.
pub fn write_report_csv<W: Write>(report: &MonthlyReport, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["service_id", "total_revenue"])?;

    let mut count = 0;
    for row in &report.rows {
        csv_writer.write_record([row.service_id.to_string(), row.total.to_string()])?;
        count += 1;
    }

    csv_writer.flush()?;
    Ok(count)
}

pub fn write_transactions_csv<W: Write>(page: &TransactionPage, writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "id",
        "sequence",
        "created_at",
        "user_id",
        "type",
        "amount",
        "service_id",
        "order_id",
        "counterparty_id",
        "description",
    ])?;

    let mut count = 0;
    for entry in &page.entries {
        csv_writer.write_record([
            entry.id.to_string(),
            entry.sequence.to_string(),
            entry.created_at.to_rfc3339(),
            entry.user_id.to_string(),
            entry.entry_type.as_str().to_string(),
            entry.amount.to_string(),
            entry.service_id.map(|id| id.to_string()).unwrap_or_default(),
            entry.order_id.map(|id| id.to_string()).unwrap_or_default(),
            entry
                .counterparty_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            entry.description.clone(),
        ])?;
        count += 1;
    }

    csv_writer.flush()?;
    Ok(count)
}
