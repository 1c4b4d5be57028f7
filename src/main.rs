use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use garagelink::{
    api,
    config::Settings,
    notifications::{LogSink, NotificationDispatcher, WebhookSink},
    payments::{PaymentGateway, StripeGateway},
    repository::{SqliteBookingRepository, SqlitePaymentRepository},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "garagelink=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!(
        "Starting garagelink server on {}:{}",
        settings.server.host,
        settings.server.port
    );

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;

    // Initialize repositories
    let booking_repo = Arc::new(SqliteBookingRepository::new(db_pool.clone()));
    let payment_repo = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));

    // Initialize the payment gateway if configured
    let gateway: Option<Arc<dyn PaymentGateway>> = if settings.stripe.enabled {
        if let Some(api_key) = settings.stripe.secret_key.clone() {
            tracing::info!("Stripe payment processing enabled");
            Some(Arc::new(StripeGateway::new(api_key)))
        } else {
            tracing::warn!("Stripe enabled but missing configuration");
            None
        }
    } else {
        tracing::info!("Stripe payment processing disabled");
        None
    };

    // Notification sinks
    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher
        .register(Arc::new(LogSink::new(settings.notifications.log_enabled)))
        .await;
    if let Some(sink) = WebhookSink::new(settings.notifications.webhook_url.clone()) {
        dispatcher.register(Arc::new(sink)).await;
    }

    // Create service context
    let context = Arc::new(ServiceContext::new(
        booking_repo,
        payment_repo,
        gateway,
        dispatcher,
        settings.marketplace.clone(),
        db_pool.clone(),
    ));

    // Background sweep that resolves bookings whose confirmation window
    // expired without both parties confirming.
    let sweep_context = context.clone();
    let sweep_interval = settings.marketplace.expiry_sweep_interval_seconds;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval));
        loop {
            interval.tick().await;
            match sweep_context
                .booking_service
                .expire_overdue(Utc::now())
                .await
            {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expired {} unconfirmed bookings", n),
                Err(e) => tracing::error!("Confirmation expiry sweep failed: {:?}", e),
            }
        }
    });

    let settings = Arc::new(settings);
    let app = api::create_app(context, settings.clone());

    let listener = tokio::net::TcpListener::bind(format!(
        "{}:{}",
        settings.server.host, settings.server.port
    ))
    .await?;

    tracing::info!(
        "Server listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );

    axum::serve(listener, app).await?;

    Ok(())
}
