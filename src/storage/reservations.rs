use anyhow::{Context, Result};
use sqlx::{Row, SqliteConnection};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Amount, Reservation, ReservationId, ReservationKey, UserId};

use super::{UnitOfWork, format_timestamp, parse_timestamp};

/// Durable escrow records.
pub struct ReservationStore;

impl ReservationStore {
    /// Save a new reservation and return its id.
    pub async fn create(uow: &mut UnitOfWork, reservation: &Reservation) -> Result<ReservationId> {
        sqlx::query(
            r#"
            INSERT INTO reservations (id, user_id, service_id, order_id, amount_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reservation.id.to_string())
        .bind(reservation.user_id)
        .bind(reservation.service_id)
        .bind(reservation.order_id)
        .bind(reservation.amount.to_cents()?)
        .bind(format_timestamp(reservation.created_at))
        .execute(uow.conn())
        .await
        .context("Failed to save reservation")?;

        debug!(reservation_id = %reservation.id, user_id = reservation.user_id, "Saved reservation");
        Ok(reservation.id)
    }

    /// Delete a reservation by id. Deleting an unknown id is not an error.
    pub async fn delete_by_id(uow: &mut UnitOfWork, id: ReservationId) -> Result<()> {
        sqlx::query("DELETE FROM reservations WHERE id = ?")
            .bind(id.to_string())
            .execute(uow.conn())
            .await
            .context("Failed to delete reservation")?;
        Ok(())
    }

    /// Check whether a reservation matching the whole natural key exists.
    pub async fn exists_by_key(conn: &mut SqliteConnection, key: &ReservationKey) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE user_id = ? AND service_id = ? AND order_id = ? AND amount_cents = ?
            ) AS found
            "#,
        )
        .bind(key.user_id)
        .bind(key.service_id)
        .bind(key.order_id)
        .bind(key.amount.to_cents()?)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to look up reservation")?;

        Ok(row.get::<i64, _>("found") != 0)
    }

    /// Delete one reservation matching the natural key, oldest first.
    /// Returns `false` when nothing matched.
    pub async fn delete_by_key(uow: &mut UnitOfWork, key: &ReservationKey) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM reservations
            WHERE id = (
                SELECT id FROM reservations
                WHERE user_id = ? AND service_id = ? AND order_id = ? AND amount_cents = ?
                ORDER BY created_at, rowid
                LIMIT 1
            )
            "#,
        )
        .bind(key.user_id)
        .bind(key.service_id)
        .bind(key.order_id)
        .bind(key.amount.to_cents()?)
        .execute(uow.conn())
        .await
        .context("Failed to delete reservation by key")?;

        Ok(result.rows_affected() > 0)
    }

    /// Total held in escrow for a user; zero when there is nothing held.
    pub async fn sum_active_by_user(conn: &mut SqliteConnection, user_id: UserId) -> Result<Amount> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount_cents), 0) AS total
            FROM reservations
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to sum reserved funds")?;

        Ok(Amount::from_cents(row.get("total")))
    }

    /// Active reservations for a user, oldest first.
    pub async fn list_by_user(conn: &mut SqliteConnection, user_id: UserId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, service_id, order_id, amount_cents, created_at
            FROM reservations
            WHERE user_id = ?
            ORDER BY created_at, rowid
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list reservations")?;

        rows.iter().map(Self::row_to_reservation).collect()
    }

    fn row_to_reservation(row: &sqlx::sqlite::SqliteRow) -> Result<Reservation> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(Reservation {
            id: Uuid::parse_str(&id_str).context("Invalid reservation ID")?,
            user_id: row.get("user_id"),
            service_id: row.get("service_id"),
            order_id: row.get("order_id"),
            amount: Amount::from_cents(row.get("amount_cents")),
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::storage::{AccountStore, Database, StoreConfig};

    async fn test_db() -> (Database, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::for_path(temp_dir.path().join("reservations.db"));
        let db = Database::init(&config).await.unwrap();

        let mut uow = db.begin_immediate().await.unwrap();
        AccountStore::create(&mut uow, 1, Utc::now()).await.unwrap();
        uow.commit().await.unwrap();

        (db, temp_dir)
    }

    fn key(order_id: i64, cents: i64) -> ReservationKey {
        ReservationKey {
            user_id: 1,
            service_id: 5,
            order_id,
            amount: Amount::from_cents(cents),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_by_key() {
        let (db, _temp) = test_db().await;

        let mut uow = db.begin_immediate().await.unwrap();
        let reservation = Reservation::new(key(9, 4000), Utc::now());
        let id = ReservationStore::create(&mut uow, &reservation).await.unwrap();
        uow.commit().await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(id, reservation.id);
        assert!(ReservationStore::exists_by_key(&mut conn, &key(9, 4000)).await.unwrap());
        // Every part of the key has to match
        assert!(!ReservationStore::exists_by_key(&mut conn, &key(9, 3999)).await.unwrap());
        assert!(!ReservationStore::exists_by_key(&mut conn, &key(10, 4000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_id_is_idempotent() {
        let (db, _temp) = test_db().await;

        let mut uow = db.begin_immediate().await.unwrap();
        let reservation = Reservation::new(key(9, 4000), Utc::now());
        let id = ReservationStore::create(&mut uow, &reservation).await.unwrap();
        ReservationStore::delete_by_id(&mut uow, id).await.unwrap();
        ReservationStore::delete_by_id(&mut uow, id).await.unwrap();
        ReservationStore::delete_by_id(&mut uow, Uuid::new_v4()).await.unwrap();
        uow.commit().await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(!ReservationStore::exists_by_key(&mut conn, &key(9, 4000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_key_removes_only_the_oldest_duplicate() {
        let (db, _temp) = test_db().await;
        let now = Utc::now();

        let mut uow = db.begin_immediate().await.unwrap();
        let older = Reservation::new(key(9, 4000), now);
        let newer = Reservation::new(key(9, 4000), now + Duration::seconds(1));
        ReservationStore::create(&mut uow, &newer).await.unwrap();
        ReservationStore::create(&mut uow, &older).await.unwrap();

        assert!(ReservationStore::delete_by_key(&mut uow, &key(9, 4000)).await.unwrap());
        let remaining = ReservationStore::list_by_user(uow.conn(), 1).await.unwrap();
        assert!(!ReservationStore::delete_by_key(&mut uow, &key(9, 1)).await.unwrap());
        uow.commit().await.unwrap();

        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, newer.id);
    }

    #[tokio::test]
    async fn test_sum_active_by_user() {
        let (db, _temp) = test_db().await;
        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(
            ReservationStore::sum_active_by_user(&mut conn, 1).await.unwrap(),
            Amount::zero()
        );
        drop(conn);

        let mut uow = db.begin_immediate().await.unwrap();
        for (order, cents) in [(1, 1050), (2, 2000)] {
            let reservation = Reservation::new(key(order, cents), Utc::now());
            ReservationStore::create(&mut uow, &reservation).await.unwrap();
        }
        uow.commit().await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(
            ReservationStore::sum_active_by_user(&mut conn, 1).await.unwrap(),
            Amount::from_cents(3050)
        );
        assert_eq!(
            ReservationStore::sum_active_by_user(&mut conn, 2).await.unwrap(),
            Amount::zero()
        );
    }
}
