use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};

use crate::{
    api::{state::AppState, ApiResponse},
    domain::MarkPaidOutRequest,
    error::{AppError, Result},
    payments::{parse_webhook_event, WebhookOutcome},
};

pub async fn pending_payouts(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let payouts = state.context.settlement_service.pending_payouts().await?;
    Ok(Json(ApiResponse::ok("Pending payouts", payouts)))
}

pub async fn mark_paid_out(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<MarkPaidOutRequest>,
) -> Result<impl IntoResponse> {
    let payment = state
        .context
        .settlement_service
        .mark_paid_out(id, body)
        .await?;
    Ok(Json(ApiResponse::ok("Payout recorded", payment)))
}

/// Payment provider webhook. The raw body is needed for signature
/// verification, so this handler takes the payload as a string rather than
/// deserialized JSON.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: String,
) -> Result<impl IntoResponse> {
    let secret = state
        .settings
        .stripe
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Gateway("Webhook secret not configured".to_string()))?;

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Validation("Missing Stripe-Signature header".to_string()))?;

    match parse_webhook_event(&payload, signature, secret)? {
        WebhookOutcome::PaymentSucceeded { intent_id } => {
            state
                .context
                .settlement_service
                .handle_payment_success(&intent_id)
                .await?;
        }
        WebhookOutcome::PaymentFailed { intent_id } => {
            state
                .context
                .settlement_service
                .handle_payment_failure(&intent_id)
                .await?;
        }
        WebhookOutcome::Ignored => {}
    }

    Ok(Json(ApiResponse::ok("Webhook processed", ())))
}
