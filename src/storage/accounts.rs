use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::domain::{Account, Amount, UserId};

use super::{UnitOfWork, format_timestamp, parse_timestamp};

/// Durable per-user balances.
///
/// Every write goes through a [`UnitOfWork`], which holds the store write
/// lock, so two balance updates on the same account can never interleave.
pub struct AccountStore;

impl AccountStore {
    /// Get an account by user ID.
    pub async fn find(conn: &mut SqliteConnection, user_id: UserId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, balance_cents, created_at, updated_at
            FROM accounts
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch account")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    /// Current balance, or `None` when the user has no account.
    pub async fn get_balance(conn: &mut SqliteConnection, user_id: UserId) -> Result<Option<Amount>> {
        Ok(Self::find(conn, user_id).await?.map(|account| account.balance))
    }

    /// Balance read inside a unit of work; the value cannot change under
    /// the caller until the unit of work ends.
    pub async fn get_balance_for_update(uow: &mut UnitOfWork, user_id: UserId) -> Result<Option<Amount>> {
        Self::get_balance(uow.conn(), user_id).await
    }

    /// Insert a zero-balance account. Returns `false` without touching the
    /// existing row when the account already exists.
    pub async fn create(uow: &mut UnitOfWork, user_id: UserId, at: DateTime<Utc>) -> Result<bool> {
        let account = Account::new(user_id, at);
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (user_id, balance_cents, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(account.user_id)
        .bind(account.balance.to_cents()?)
        .bind(format_timestamp(account.created_at))
        .bind(format_timestamp(account.updated_at))
        .execute(uow.conn())
        .await
        .context("Failed to create account")?;

        let created = result.rows_affected() == 1;
        debug!(user_id, created, "Account create");
        Ok(created)
    }

    /// Add `delta` (possibly negative) to the balance in one statement and
    /// return the new balance, or `None` when the account does not exist.
    pub async fn apply_delta(
        uow: &mut UnitOfWork,
        user_id: UserId,
        delta: Amount,
        at: DateTime<Utc>,
    ) -> Result<Option<Amount>> {
        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents + ?, updated_at = ?
            WHERE user_id = ?
            RETURNING balance_cents
            "#,
        )
        .bind(delta.to_cents()?)
        .bind(format_timestamp(at))
        .bind(user_id)
        .fetch_optional(uow.conn())
        .await
        .context("Failed to update account balance")?;

        let balance = row.map(|row| Amount::from_cents(row.get("balance_cents")));
        debug!(user_id, %delta, balance = ?balance.map(|b| b.to_string()), "Applied balance delta");
        Ok(balance)
    }

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Account {
            user_id: row.get("user_id"),
            balance: Amount::from_cents(row.get("balance_cents")),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }
}
