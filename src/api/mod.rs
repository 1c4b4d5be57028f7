pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::Settings, service::ServiceContext};
use state::AppState;

/// ServiceResult-style envelope: every successful operation returns a
/// success flag, a stable message, and the data. Failures go through
/// `AppError::into_response`, which produces the same shape with an error
/// kind attached.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

pub fn create_app(context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(context, settings);

    Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        .nest("/api", api_routes())
        .with_state(app_state)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(handlers::bookings::create))
        .route("/bookings/:id/confirm", post(handlers::bookings::confirm))
        .route("/bookings/:id/decline", post(handlers::bookings::decline))
        .route(
            "/bookings/:id/transition",
            post(handlers::bookings::transition),
        )
        .route(
            "/bookings/:id/confirmation-status",
            get(handlers::bookings::confirmation_status),
        )
        .route(
            "/bookings/:id/time-status",
            get(handlers::bookings::time_status),
        )
        .route(
            "/bookings/:id/payment-intent",
            post(handlers::bookings::create_payment_intent),
        )
        .route("/bookings/:id/refund", post(handlers::bookings::refund))
        .route("/payouts/pending", get(handlers::payments::pending_payouts))
        .route(
            "/payments/:id/payout",
            post(handlers::payments::mark_paid_out),
        )
        // Public webhook endpoint (signature-verified, no session auth)
        .route("/webhooks/stripe", post(handlers::payments::stripe_webhook))
}
