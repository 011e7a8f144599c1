use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::domain::{Amount, MonthlyReportRow, ReportPeriod, RevenueRecord};

use super::{UnitOfWork, format_timestamp};

/// Append-only record of settled revenue.
pub struct RevenueLedger;

impl RevenueLedger {
    pub async fn append(uow: &mut UnitOfWork, record: &RevenueRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revenue_records (user_id, service_id, order_id, amount_cents, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.user_id)
        .bind(record.service_id)
        .bind(record.order_id)
        .bind(record.amount.to_cents()?)
        .bind(format_timestamp(record.created_at))
        .execute(uow.conn())
        .await
        .context("Failed to add revenue record")?;

        debug!(service_id = record.service_id, order_id = record.order_id, amount = %record.amount, "Recorded revenue");
        Ok(())
    }

    /// Sum revenue per service for records created within the period.
    /// Rows are ordered by service id; an empty month yields no rows.
    pub async fn aggregate_for_month(
        conn: &mut SqliteConnection,
        period: &ReportPeriod,
    ) -> Result<Vec<MonthlyReportRow>> {
        let rows = sqlx::query(
            r#"
            SELECT service_id, SUM(amount_cents) AS total
            FROM revenue_records
            WHERE created_at >= ? AND created_at <= ?
            GROUP BY service_id
            ORDER BY service_id
            "#,
        )
        .bind(format_timestamp(period.start))
        .bind(format_timestamp(period.last_instant()))
        .fetch_all(&mut *conn)
        .await
        .context("Failed to aggregate monthly revenue")?;

        Ok(rows
            .iter()
            .map(|row| MonthlyReportRow {
                service_id: row.get("service_id"),
                total: Amount::from_cents(row.get("total")),
            })
            .collect())
    }
}
