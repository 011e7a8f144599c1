use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Amount, EntryId, EntryQuery, EntryType, LedgerEntry, SortField, SortOrder, UserId,
};

use super::{UnitOfWork, format_timestamp, parse_timestamp};

const ENTRY_COLUMNS: &str = "sequence, id, user_id, service_id, order_id, counterparty_id, amount_cents, entry_type, description, created_at";

/// Append-only log of every balance-affecting event.
pub struct TransactionLedger;

impl TransactionLedger {
    /// Append an entry. Assigns the next sequence number to `entry`.
    pub async fn append(uow: &mut UnitOfWork, entry: &mut LedgerEntry) -> Result<EntryId> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, service_id, order_id, counterparty_id, amount_cents, entry_type, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING sequence
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.user_id)
        .bind(entry.service_id)
        .bind(entry.order_id)
        .bind(entry.counterparty_id)
        .bind(entry.amount.to_cents()?)
        .bind(entry.entry_type.as_str())
        .bind(&entry.description)
        .bind(format_timestamp(entry.created_at))
        .fetch_one(uow.conn())
        .await
        .context("Failed to append ledger entry")?;

        entry.sequence = row.get("sequence");
        debug!(entry_id = %entry.id, sequence = entry.sequence, entry_type = %entry.entry_type, "Appended ledger entry");
        Ok(entry.id)
    }

    /// Get an entry by ID.
    pub async fn get(conn: &mut SqliteConnection, id: EntryId) -> Result<Option<LedgerEntry>> {
        let query = format!("SELECT {} FROM transactions WHERE id = ?", ENTRY_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch ledger entry")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// One page of a user's entries plus the user's total entry count.
    /// Ties on the sort column fall back to append order in the same
    /// direction.
    pub async fn list(
        conn: &mut SqliteConnection,
        user_id: UserId,
        query: &EntryQuery,
    ) -> Result<(Vec<LedgerEntry>, u64)> {
        let total: i64 = sqlx::query("SELECT COUNT(*) AS count FROM transactions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to count ledger entries")?
            .get("count");

        // Column and direction come from closed enums, never from input text
        let column = match query.sort_by {
            SortField::CreatedAt => "created_at",
            SortField::Amount => "amount_cents",
        };
        let direction = match query.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = ? ORDER BY {} {}, sequence {} LIMIT ? OFFSET ?",
            ENTRY_COLUMNS, column, direction, direction
        );

        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(i64::from(query.limit))
            .bind(query.offset())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list ledger entries")?;

        let entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, u64::try_from(total).unwrap_or_default()))
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
        let id_str: String = row.get("id");
        let entry_type_str: String = row.get("entry_type");
        let created_at_str: String = row.get("created_at");

        Ok(LedgerEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            sequence: row.get("sequence"),
            user_id: row.get("user_id"),
            service_id: row.get("service_id"),
            order_id: row.get("order_id"),
            counterparty_id: row.get("counterparty_id"),
            amount: Amount::from_cents(row.get("amount_cents")),
            entry_type: EntryType::from_str(&entry_type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid entry type: {}", entry_type_str))?,
            description: row.get("description"),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}
