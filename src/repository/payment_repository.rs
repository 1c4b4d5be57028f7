use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::{NewPayment, Payment, PayoutMethod, PendingPayout, StripePaymentStatus},
    error::{AppError, Result},
    repository::PaymentRepository,
};

#[derive(FromRow)]
struct PaymentRow {
    id: i64,
    booking_id: i64,
    total_cents: i64,
    commission_cents: i64,
    workshop_cents: i64,
    commission_rate: f64,
    stripe_payment_status: String,
    stripe_payment_intent_id: String,
    is_paid_out: bool,
    payout_date: Option<NaiveDateTime>,
    payout_method: Option<String>,
    payout_reference: Option<String>,
    payout_notes: Option<String>,
    created_at: NaiveDateTime,
    paid_at: Option<NaiveDateTime>,
}

const PAYMENT_COLUMNS: &str = r#"
    id, booking_id, total_cents, commission_cents, workshop_cents,
    commission_rate, stripe_payment_status, stripe_payment_intent_id,
    is_paid_out, payout_date, payout_method, payout_reference,
    payout_notes, created_at, paid_at
"#;

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: row.id,
            booking_id: row.booking_id,
            total_cents: row.total_cents,
            commission_cents: row.commission_cents,
            workshop_cents: row.workshop_cents,
            commission_rate: row.commission_rate,
            stripe_payment_status: StripePaymentStatus::parse(&row.stripe_payment_status)
                .map_err(|e| AppError::Database(e.to_string()))?,
            stripe_payment_intent_id: row.stripe_payment_intent_id,
            is_paid_out: row.is_paid_out,
            payout_date: row.payout_date.map(utc),
            payout_method: row
                .payout_method
                .as_deref()
                .map(PayoutMethod::parse)
                .transpose()
                .map_err(|e| AppError::Database(e.to_string()))?,
            payout_reference: row.payout_reference,
            payout_notes: row.payout_notes,
            created_at: utc(row.created_at),
            paid_at: row.paid_at.map(utc),
        })
    }
}

fn utc(naive: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(naive, Utc)
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, new: NewPayment) -> Result<Payment> {
        let now = Utc::now().naive_utc();
        // The unique indexes on booking_id and the intent id turn a
        // concurrent duplicate insert into a constraint error here instead
        // of a second payment row.
        let result = sqlx::query(
            r#"
            INSERT INTO payments (
                booking_id, total_cents, commission_cents, workshop_cents,
                commission_rate, stripe_payment_status, stripe_payment_intent_id,
                is_paid_out, created_at
            ) VALUES (?, ?, ?, ?, ?, 'Pending', ?, 0, ?)
            "#,
        )
        .bind(new.booking_id)
        .bind(new.total_cents)
        .bind(new.commission_cents)
        .bind(new.workshop_cents)
        .bind(new.commission_rate)
        .bind(&new.stripe_payment_intent_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("A payment already exists for this booking".to_string())
            }
            other => AppError::Database(other.to_string()),
        })?;

        let id = result.last_insert_rowid();
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created payment".to_string()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_booking(&self, booking_id: i64) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE booking_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(booking_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE stripe_payment_intent_id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn mark_succeeded(&self, intent_id: &str, paid_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET stripe_payment_status = 'Succeeded', paid_at = ?
            WHERE stripe_payment_intent_id = ? AND stripe_payment_status = 'Pending'
            "#,
        )
        .bind(paid_at.naive_utc())
        .bind(intent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, intent_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET stripe_payment_status = 'Failed'
            WHERE stripe_payment_intent_id = ? AND stripe_payment_status = 'Pending'
            "#,
        )
        .bind(intent_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_refunded(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET stripe_payment_status = 'Refunded'
            WHERE id = ? AND stripe_payment_status = 'Succeeded' AND is_paid_out = 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_paid_out(
        &self,
        id: i64,
        method: PayoutMethod,
        reference: Option<String>,
        notes: Option<String>,
        payout_date: DateTime<Utc>,
    ) -> Result<bool> {
        // Single atomic conditional update. The `is_paid_out = 0` predicate
        // plus the rows-affected check is what makes double payouts
        // impossible under concurrent marking attempts; the status predicate
        // keeps a refund that lands between the caller's read and this
        // update from being disbursed anyway.
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET is_paid_out = 1,
                payout_date = ?,
                payout_method = ?,
                payout_reference = ?,
                payout_notes = ?
            WHERE id = ? AND is_paid_out = 0 AND stripe_payment_status = 'Succeeded'
            "#,
        )
        .bind(payout_date.naive_utc())
        .bind(method.as_str())
        .bind(reference)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_pending_payouts(&self) -> Result<Vec<PendingPayout>> {
        #[derive(FromRow)]
        struct PayoutRow {
            #[sqlx(flatten)]
            payment: PaymentRow,
            appointment_date: NaiveDateTime,
            workshop_name: String,
            service_name: String,
            car_owner_name: String,
        }

        let rows = sqlx::query_as::<_, PayoutRow>(
            r#"
            SELECT
                p.id, p.booking_id, p.total_cents, p.commission_cents,
                p.workshop_cents, p.commission_rate, p.stripe_payment_status,
                p.stripe_payment_intent_id, p.is_paid_out, p.payout_date,
                p.payout_method, p.payout_reference, p.payout_notes,
                p.created_at, p.paid_at,
                b.appointment_date AS appointment_date,
                w.name AS workshop_name,
                s.name AS service_name,
                u.display_name AS car_owner_name
            FROM payments p
            JOIN bookings b ON b.id = p.booking_id
            JOIN workshop_profiles w ON w.id = b.workshop_profile_id
            JOIN workshop_services s ON s.id = b.workshop_service_id
            JOIN cars c ON c.id = b.car_id
            JOIN users u ON u.id = c.owner_user_id
            WHERE p.stripe_payment_status = 'Succeeded'
              AND p.is_paid_out = 0
              AND b.status = 'Completed'
            ORDER BY p.paid_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let booking_id = row.payment.booking_id;
                Ok(PendingPayout {
                    payment: Self::row_to_payment(row.payment)?,
                    booking_id,
                    appointment_date: utc(row.appointment_date),
                    workshop_name: row.workshop_name,
                    service_name: row.service_name,
                    car_owner_name: row.car_owner_name,
                })
            })
            .collect()
    }
}
