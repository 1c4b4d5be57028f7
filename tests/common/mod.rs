use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use garagelink::{
    config::MarketplaceConfig,
    domain::{BookingStatus, CreateBookingRequest, PaymentMethod},
    notifications::NotificationDispatcher,
    payments::FakeGateway,
    repository::{SqliteBookingRepository, SqlitePaymentRepository},
    service::{ServiceContext, TransitionActor},
};

pub struct TestApp {
    pub context: Arc<ServiceContext>,
    pub gateway: Arc<FakeGateway>,
    pub pool: SqlitePool,
    pub car_owner: i64,
    pub workshop_owner: i64,
    pub car_id: i64,
    /// Brake pad replacement, 100.00.
    pub brake_service_id: i64,
    /// Oil change, 49.99 (awkward commission rounding).
    pub oil_service_id: i64,
}

pub async fn setup() -> anyhow::Result<TestApp> {
    // A single connection keeps every query on the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let car_owner = insert_user(&pool, "Dana Fields").await?;
    let workshop_owner = insert_user(&pool, "Marco Reyes").await?;

    let workshop_id =
        sqlx::query("INSERT INTO workshop_profiles (owner_user_id, name) VALUES (?, ?)")
            .bind(workshop_owner)
            .bind("Reyes Auto Care")
            .execute(&pool)
            .await?
            .last_insert_rowid();

    let car_id = sqlx::query("INSERT INTO cars (owner_user_id, label) VALUES (?, ?)")
        .bind(car_owner)
        .bind("Honda Civic 2019")
        .execute(&pool)
        .await?
        .last_insert_rowid();

    let brake_service_id = insert_service(&pool, workshop_id, "Brake pad replacement", 10_000, 90).await?;
    let oil_service_id = insert_service(&pool, workshop_id, "Oil change", 4_999, 30).await?;

    let booking_repo = Arc::new(SqliteBookingRepository::new(pool.clone()));
    let payment_repo = Arc::new(SqlitePaymentRepository::new(pool.clone()));
    let gateway = Arc::new(FakeGateway::new());
    let dispatcher = Arc::new(NotificationDispatcher::new());

    let context = Arc::new(ServiceContext::new(
        booking_repo,
        payment_repo,
        Some(gateway.clone()),
        dispatcher,
        MarketplaceConfig::default(),
        pool.clone(),
    ));

    Ok(TestApp {
        context,
        gateway,
        pool,
        car_owner,
        workshop_owner,
        car_id,
        brake_service_id,
        oil_service_id,
    })
}

async fn insert_user(pool: &SqlitePool, name: &str) -> anyhow::Result<i64> {
    Ok(sqlx::query("INSERT INTO users (display_name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?
        .last_insert_rowid())
}

async fn insert_service(
    pool: &SqlitePool,
    workshop_id: i64,
    name: &str,
    price_cents: i64,
    duration_minutes: i64,
) -> anyhow::Result<i64> {
    Ok(sqlx::query(
        "INSERT INTO workshop_services (workshop_profile_id, name, price_cents, duration_minutes) VALUES (?, ?, ?, ?)",
    )
    .bind(workshop_id)
    .bind(name)
    .bind(price_cents)
    .bind(duration_minutes)
    .execute(pool)
    .await?
    .last_insert_rowid())
}

impl TestApp {
    pub async fn create_card_booking(&self, service_id: i64) -> anyhow::Result<i64> {
        let booking = self
            .context
            .booking_service
            .create_booking(
                self.car_owner,
                CreateBookingRequest {
                    car_id: self.car_id,
                    workshop_service_id: service_id,
                    appointment_date: chrono::Utc::now() + chrono::Duration::hours(2),
                    payment_method: PaymentMethod::CreditCard,
                },
            )
            .await?;
        Ok(booking.id)
    }

    /// Confirms both parties and walks the booking through the workshop
    /// flow to Completed.
    pub async fn drive_to_completed(&self, booking_id: i64) -> anyhow::Result<()> {
        let svc = &self.context.booking_service;
        svc.confirm(booking_id, self.car_owner).await?;
        svc.confirm(booking_id, self.workshop_owner).await?;
        for status in [
            BookingStatus::InProgress,
            BookingStatus::ReadyForPickup,
            BookingStatus::Completed,
        ] {
            svc.transition(booking_id, status, TransitionActor::User(self.workshop_owner))
                .await?;
        }
        Ok(())
    }
}
