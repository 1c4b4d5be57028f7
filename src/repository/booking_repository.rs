use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::{
        ActorRole, Booking, BookingParties, BookingPaymentStatus, BookingStatus, NewBooking,
        PaymentMethod, ServiceSnapshot,
    },
    error::{AppError, Result},
    repository::BookingRepository,
};

#[derive(FromRow)]
struct BookingRow {
    id: i64,
    car_id: i64,
    workshop_profile_id: i64,
    workshop_service_id: i64,
    price_cents: i64,
    duration_minutes: i64,
    status: String,
    appointment_date: NaiveDateTime,
    payment_method: String,
    payment_status: String,
    paid_amount_cents: Option<i64>,
    car_owner_confirmed: bool,
    workshop_owner_confirmed: bool,
    confirmation_sent_at: Option<NaiveDateTime>,
    confirmation_deadline: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

const BOOKING_COLUMNS: &str = r#"
    id, car_id, workshop_profile_id, workshop_service_id,
    price_cents, duration_minutes, status, appointment_date,
    payment_method, payment_status, paid_amount_cents,
    car_owner_confirmed, workshop_owner_confirmed,
    confirmation_sent_at, confirmation_deadline,
    created_at, updated_at
"#;

pub struct SqliteBookingRepository {
    pool: SqlitePool,
}

impl SqliteBookingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_booking(row: BookingRow) -> Result<Booking> {
        Ok(Booking {
            id: row.id,
            car_id: row.car_id,
            workshop_profile_id: row.workshop_profile_id,
            workshop_service_id: row.workshop_service_id,
            price_cents: row.price_cents,
            duration_minutes: row.duration_minutes,
            status: BookingStatus::parse(&row.status)
                .map_err(|e| AppError::Database(e.to_string()))?,
            appointment_date: utc(row.appointment_date),
            payment_method: PaymentMethod::parse(&row.payment_method)
                .map_err(|e| AppError::Database(e.to_string()))?,
            payment_status: BookingPaymentStatus::parse(&row.payment_status)
                .map_err(|e| AppError::Database(e.to_string()))?,
            paid_amount_cents: row.paid_amount_cents,
            car_owner_confirmed: row.car_owner_confirmed,
            workshop_owner_confirmed: row.workshop_owner_confirmed,
            confirmation_sent_at: row.confirmation_sent_at.map(utc),
            confirmation_deadline: row.confirmation_deadline.map(utc),
            created_at: utc(row.created_at),
            updated_at: utc(row.updated_at),
        })
    }
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

#[async_trait]
impl BookingRepository for SqliteBookingRepository {
    async fn create(&self, new: NewBooking) -> Result<Booking> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                car_id, workshop_profile_id, workshop_service_id,
                price_cents, duration_minutes, status, appointment_date,
                payment_method, payment_status,
                car_owner_confirmed, workshop_owner_confirmed,
                confirmation_sent_at, confirmation_deadline,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 'Pending', ?, ?, 'Unpaid', 0, 0, ?, ?, ?, ?)
            "#,
        )
        .bind(new.car_id)
        .bind(new.workshop_profile_id)
        .bind(new.workshop_service_id)
        .bind(new.price_cents)
        .bind(new.duration_minutes)
        .bind(new.appointment_date.naive_utc())
        .bind(new.payment_method.as_str())
        .bind(new.confirmation_sent_at.naive_utc())
        .bind(new.confirmation_deadline.naive_utc())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created booking".to_string()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = ?",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_booking(r)?)),
            None => Ok(None),
        }
    }

    async fn find_parties(&self, id: i64) -> Result<Option<BookingParties>> {
        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT cars.owner_user_id, workshop_profiles.owner_user_id
            FROM bookings
            JOIN cars ON cars.id = bookings.car_id
            JOIN workshop_profiles ON workshop_profiles.id = bookings.workshop_profile_id
            WHERE bookings.id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(|(car_owner_user_id, workshop_owner_user_id)| BookingParties {
            car_owner_user_id,
            workshop_owner_user_id,
        }))
    }

    async fn update_status(
        &self,
        id: i64,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<bool> {
        // Conditional update: the WHERE clause re-checks the pre-state so
        // two concurrent writers cannot both apply the same edge.
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(Utc::now().naive_utc())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_confirmation_flag(&self, id: i64, role: ActorRole) -> Result<bool> {
        let column = match role {
            ActorRole::CarOwner => "car_owner_confirmed",
            ActorRole::Workshop => "workshop_owner_confirmed",
            ActorRole::System => {
                return Err(AppError::Internal(
                    "System actor has no confirmation flag".to_string(),
                ))
            }
        };

        // Setting the flag again is a no-op; only a booking that already
        // left Pending refuses the write.
        let result = sqlx::query(&format!(
            "UPDATE bookings SET {} = 1, updated_at = ? WHERE id = ? AND status = 'Pending'",
            column
        ))
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_paid(&self, id: i64, amount_cents: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET payment_status = 'Paid', paid_amount_cents = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(amount_cents)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE status = 'Pending'
              AND confirmation_deadline IS NOT NULL
              AND confirmation_deadline <= ?
              AND NOT (car_owner_confirmed = 1 AND workshop_owner_confirmed = 1)
            "#,
            BOOKING_COLUMNS
        ))
        .bind(now.naive_utc())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_booking).collect()
    }

    async fn find_car_owner(&self, car_id: i64) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT owner_user_id FROM cars WHERE id = ?")
            .bind(car_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(|(owner_user_id,)| owner_user_id))
    }

    async fn find_service_snapshot(&self, service_id: i64) -> Result<Option<ServiceSnapshot>> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT workshop_profile_id, price_cents, duration_minutes
            FROM workshop_services
            WHERE id = ?
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(
            |(workshop_profile_id, price_cents, duration_minutes)| ServiceSnapshot {
                workshop_profile_id,
                price_cents,
                duration_minutes,
            },
        ))
    }
}
