use chrono::NaiveDateTime;
use sqlx::SqlitePool;

use crate::db::models::Appointment;
use crate::error::{AppError, AppResult};

/// Repository for appointment reminder reads and marker writes.
///
/// Implementation notes:
/// - Marker writes are conditional single-statement UPDATEs guarded on the
///   marker still being NULL, so at-most-once marking holds even when two
///   overlapping ticks observe the same row as eligible.
/// - Both fetches join the merchant contact fields so the sender never needs
///   a second query per row.
pub struct AppointmentRepository;

impl AppointmentRepository {
    /// All appointments still awaiting their initial reminder.
    pub async fn find_pending_initial(pool: &SqlitePool) -> AppResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT
                a.id,
                a.customer_name,
                a.phone_number,
                a.appointment_date,
                a.initial_sent_at,
                a.opened_at,
                a.follow_up_sent_at,
                m.email AS merchant_email,
                m.merchant_name AS merchant_name
            FROM appointments a
            JOIN merchants m ON m.id = a.merchant_id
            WHERE a.initial_sent_at IS NULL
            ORDER BY a.appointment_date ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// All appointments whose initial reminder went out but was never opened
    /// and which have not yet received a follow-up.
    pub async fn find_pending_follow_up(pool: &SqlitePool) -> AppResult<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT
                a.id,
                a.customer_name,
                a.phone_number,
                a.appointment_date,
                a.initial_sent_at,
                a.opened_at,
                a.follow_up_sent_at,
                m.email AS merchant_email,
                m.merchant_name AS merchant_name
            FROM appointments a
            JOIN merchants m ON m.id = a.merchant_id
            WHERE a.initial_sent_at IS NOT NULL
              AND a.opened_at IS NULL
              AND a.follow_up_sent_at IS NULL
            ORDER BY a.appointment_date ASC
            "#,
        )
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Record the initial reminder as sent. Returns `false` when another tick
    /// marked the row first (the guard saw a non-NULL marker).
    pub async fn mark_initial_sent(
        pool: &SqlitePool,
        id: &str,
        sent_at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET initial_sent_at = ?, updated_at = ?
            WHERE id = ? AND initial_sent_at IS NULL
            "#,
        )
        .bind(sent_at)
        .bind(sent_at)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the follow-up reminder as sent. The guard also requires the
    /// initial marker to be present, so a follow-up can never be recorded on
    /// a row that skipped the initial reminder.
    pub async fn mark_follow_up_sent(
        pool: &SqlitePool,
        id: &str,
        sent_at: NaiveDateTime,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET follow_up_sent_at = ?, updated_at = ?
            WHERE id = ?
              AND initial_sent_at IS NOT NULL
              AND follow_up_sent_at IS NULL
            "#,
        )
        .bind(sent_at)
        .bind(sent_at)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sqlx::sqlite::SqlitePoolOptions;
    use uuid::Uuid;

    async fn test_pool() -> SqlitePool {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrations");
        pool
    }

    async fn seed_merchant(pool: &SqlitePool) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO merchants (id, merchant_name, email) VALUES (?, ?, ?)")
            .bind(&id)
            .bind("Glow Salon")
            .bind("owner@glowsalon.test")
            .execute(pool)
            .await
            .expect("insert merchant");
        id
    }

    async fn seed_appointment(
        pool: &SqlitePool,
        merchant_id: &str,
        appointment_date: NaiveDateTime,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO appointments (id, merchant_id, customer_name, phone_number, appointment_date)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(merchant_id)
        .bind("Ayesha")
        .bind("+15550100")
        .bind(appointment_date)
        .execute(pool)
        .await
        .expect("insert appointment");
        id
    }

    #[tokio::test]
    async fn pending_initial_returns_unmarked_rows_with_merchant_fields() {
        let pool = test_pool().await;
        let merchant = seed_merchant(&pool).await;
        let date = Utc::now().naive_utc() - Duration::hours(3);
        let id = seed_appointment(&pool, &merchant, date).await;

        let rows = AppointmentRepository::find_pending_initial(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].merchant_email, "owner@glowsalon.test");
        assert_eq!(rows[0].merchant_name, "Glow Salon");
        assert!(rows[0].initial_sent_at.is_none());
    }

    #[tokio::test]
    async fn marked_rows_drop_out_of_pending_initial() {
        let pool = test_pool().await;
        let merchant = seed_merchant(&pool).await;
        let date = Utc::now().naive_utc() - Duration::hours(3);
        let id = seed_appointment(&pool, &merchant, date).await;

        let now = Utc::now().naive_utc();
        assert!(AppointmentRepository::mark_initial_sent(&pool, &id, now).await.unwrap());

        let rows = AppointmentRepository::find_pending_initial(&pool).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn mark_initial_sent_is_at_most_once() {
        let pool = test_pool().await;
        let merchant = seed_merchant(&pool).await;
        let id = seed_appointment(&pool, &merchant, Utc::now().naive_utc()).await;

        let now = Utc::now().naive_utc();
        assert!(AppointmentRepository::mark_initial_sent(&pool, &id, now).await.unwrap());
        // Second writer loses: the guard sees a non-NULL marker.
        assert!(!AppointmentRepository::mark_initial_sent(&pool, &id, now).await.unwrap());
    }

    #[tokio::test]
    async fn follow_up_requires_initial_marker() {
        let pool = test_pool().await;
        let merchant = seed_merchant(&pool).await;
        let id = seed_appointment(&pool, &merchant, Utc::now().naive_utc()).await;

        let now = Utc::now().naive_utc();
        assert!(!AppointmentRepository::mark_follow_up_sent(&pool, &id, now).await.unwrap());

        assert!(AppointmentRepository::mark_initial_sent(&pool, &id, now).await.unwrap());
        assert!(AppointmentRepository::mark_follow_up_sent(&pool, &id, now).await.unwrap());
        assert!(!AppointmentRepository::mark_follow_up_sent(&pool, &id, now).await.unwrap());
    }

    #[tokio::test]
    async fn pending_follow_up_excludes_opened_rows() {
        let pool = test_pool().await;
        let merchant = seed_merchant(&pool).await;
        let now = Utc::now().naive_utc();

        let unopened = seed_appointment(&pool, &merchant, now - Duration::hours(30)).await;
        let opened = seed_appointment(&pool, &merchant, now - Duration::hours(30)).await;
        AppointmentRepository::mark_initial_sent(&pool, &unopened, now).await.unwrap();
        AppointmentRepository::mark_initial_sent(&pool, &opened, now).await.unwrap();
        sqlx::query("UPDATE appointments SET opened_at = ? WHERE id = ?")
            .bind(now)
            .bind(&opened)
            .execute(&pool)
            .await
            .unwrap();

        let rows = AppointmentRepository::find_pending_follow_up(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, unopened);
    }

    #[tokio::test]
    async fn pending_follow_up_excludes_rows_without_initial() {
        let pool = test_pool().await;
        let merchant = seed_merchant(&pool).await;
        seed_appointment(&pool, &merchant, Utc::now().naive_utc() - Duration::hours(30)).await;

        let rows = AppointmentRepository::find_pending_follow_up(&pool).await.unwrap();
        assert!(rows.is_empty());
    }
}
