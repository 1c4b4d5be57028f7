use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::{
    api::{state::AppState, ApiResponse},
    domain::{BookingStatus, CreateBookingRequest},
    error::Result,
    service::TransitionActor,
};

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    pub actor_user_id: i64,
    #[serde(flatten)]
    pub request: CreateBookingRequest,
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub actor_user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub actor_user_id: i64,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RequesterQuery {
    pub requester_user_id: i64,
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateBookingBody>,
) -> Result<impl IntoResponse> {
    let booking = state
        .context
        .booking_service
        .create_booking(body.actor_user_id, body.request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Booking created", booking)),
    ))
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse> {
    let booking = state
        .context
        .booking_service
        .confirm(id, body.actor_user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Confirmation recorded", booking)))
}

pub async fn decline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<ActorBody>,
) -> Result<impl IntoResponse> {
    let booking = state
        .context
        .booking_service
        .decline(id, body.actor_user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Booking declined", booking)))
}

pub async fn transition(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<TransitionBody>,
) -> Result<impl IntoResponse> {
    let requested = BookingStatus::parse(&body.status)?;
    let booking = state
        .context
        .booking_service
        .transition(id, requested, TransitionActor::User(body.actor_user_id))
        .await?;
    Ok(Json(ApiResponse::ok("Transition applied", booking)))
}

pub async fn confirmation_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RequesterQuery>,
) -> Result<impl IntoResponse> {
    let status = state
        .context
        .booking_service
        .confirmation_status(id, query.requester_user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Confirmation status", status)))
}

pub async fn time_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RequesterQuery>,
) -> Result<impl IntoResponse> {
    let status = state
        .context
        .booking_service
        .time_status(id, query.requester_user_id)
        .await?;
    Ok(Json(ApiResponse::ok("Time status", status)))
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let created = state
        .context
        .settlement_service
        .create_payment_intent(id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Payment intent created", created)),
    ))
}

pub async fn refund(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let payment = state.context.settlement_service.refund_payment(id).await?;
    Ok(Json(ApiResponse::ok("Refund issued", payment)))
}
