mod common;

use chrono::{Duration, Utc};

use garagelink::{
    domain::{BookingStatus, CreateBookingRequest, PaymentMethod},
    error::AppError,
    service::TransitionActor,
};

#[tokio::test]
async fn new_booking_projects_time_and_confirmation_status() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;

    let time = app
        .context
        .booking_service
        .time_status(booking_id, app.car_owner)
        .await?;
    assert!(!time.has_arrived);
    assert!(
        (7_100..=7_200).contains(&time.seconds_until_arrival),
        "expected ~2h, got {}",
        time.seconds_until_arrival
    );
    assert!(time.can_still_change_response);
    assert_eq!(time.has_arrived, time.seconds_until_arrival <= 0);

    let confirmation = app
        .context
        .booking_service
        .confirmation_status(booking_id, app.workshop_owner)
        .await?;
    assert_eq!(confirmation.status, BookingStatus::Pending);
    assert!(!confirmation.car_owner_confirmed);
    assert!(!confirmation.workshop_owner_confirmed);
    // Default window is 30 minutes.
    assert!((1_700..=1_800).contains(&confirmation.remaining_seconds));

    Ok(())
}

#[tokio::test]
async fn projections_require_a_party_to_the_booking() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;

    let outsider = 9_999;
    let err = app
        .context
        .booking_service
        .time_status(booking_id, outsider)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    Ok(())
}

#[tokio::test]
async fn booking_requires_future_appointment_and_owned_car() -> anyhow::Result<()> {
    let app = common::setup().await?;

    let past = app
        .context
        .booking_service
        .create_booking(
            app.car_owner,
            CreateBookingRequest {
                car_id: app.car_id,
                workshop_service_id: app.brake_service_id,
                appointment_date: Utc::now() - Duration::hours(1),
                payment_method: PaymentMethod::Cash,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(past, AppError::Validation(_)));

    let not_owner = app
        .context
        .booking_service
        .create_booking(
            app.workshop_owner,
            CreateBookingRequest {
                car_id: app.car_id,
                workshop_service_id: app.brake_service_id,
                appointment_date: Utc::now() + Duration::hours(1),
                payment_method: PaymentMethod::Cash,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(not_owner, AppError::Unauthorized));

    Ok(())
}

#[tokio::test]
async fn dual_confirmation_promotes_to_confirmed() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    let after_one = svc.confirm(booking_id, app.car_owner).await?;
    assert_eq!(after_one.status, BookingStatus::Pending);
    assert!(after_one.car_owner_confirmed);
    assert!(!after_one.workshop_owner_confirmed);

    // Confirming twice with the same role is a no-op, not an error.
    let repeated = svc.confirm(booking_id, app.car_owner).await?;
    assert_eq!(repeated.status, after_one.status);
    assert_eq!(repeated.car_owner_confirmed, after_one.car_owner_confirmed);
    assert_eq!(
        repeated.workshop_owner_confirmed,
        after_one.workshop_owner_confirmed
    );

    let after_both = svc.confirm(booking_id, app.workshop_owner).await?;
    assert_eq!(after_both.status, BookingStatus::Confirmed);
    assert!(after_both.both_parties_confirmed());

    Ok(())
}

#[tokio::test]
async fn decline_rejects_regardless_of_other_party() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    svc.confirm(booking_id, app.car_owner).await?;
    let declined = svc.decline(booking_id, app.workshop_owner).await?;
    assert_eq!(declined.status, BookingStatus::Rejected);

    // Terminal: neither confirm-driven promotion nor another transition.
    let err = svc
        .transition(
            booking_id,
            BookingStatus::Confirmed,
            TransitionActor::User(app.car_owner),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    Ok(())
}

#[tokio::test]
async fn transition_rejects_edges_outside_the_lifecycle() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    // Pending -> Completed skips the whole flow.
    let err = svc
        .transition(
            booking_id,
            BookingStatus::Completed,
            TransitionActor::User(app.workshop_owner),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    // Pending -> Confirmed without both flags is refused even for a party.
    let err = svc
        .transition(
            booking_id,
            BookingStatus::Confirmed,
            TransitionActor::User(app.workshop_owner),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    Ok(())
}

#[tokio::test]
async fn only_workshop_marks_work_ready_for_pickup() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    svc.confirm(booking_id, app.car_owner).await?;
    svc.confirm(booking_id, app.workshop_owner).await?;
    svc.transition(
        booking_id,
        BookingStatus::InProgress,
        TransitionActor::User(app.workshop_owner),
    )
    .await?;

    let err = svc
        .transition(
            booking_id,
            BookingStatus::ReadyForPickup,
            TransitionActor::User(app.car_owner),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized));

    let moved = svc
        .transition(
            booking_id,
            BookingStatus::ReadyForPickup,
            TransitionActor::User(app.workshop_owner),
        )
        .await?;
    assert_eq!(moved.status, BookingStatus::ReadyForPickup);

    Ok(())
}

#[tokio::test]
async fn cancellation_closes_at_the_appointment_time() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    svc.confirm(booking_id, app.car_owner).await?;
    svc.confirm(booking_id, app.workshop_owner).await?;

    // Simulate the appointment having arrived.
    sqlx::query("UPDATE bookings SET appointment_date = ? WHERE id = ?")
        .bind((Utc::now() - Duration::minutes(5)).naive_utc())
        .bind(booking_id)
        .execute(&app.pool)
        .await?;

    let err = svc
        .transition(
            booking_id,
            BookingStatus::Cancelled,
            TransitionActor::User(app.car_owner),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    Ok(())
}

#[tokio::test]
async fn closed_window_rejects_responses_before_the_sweep_runs() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    // Deadline in the past, sweep not yet run: the booking is still Pending
    // but neither party can respond any more.
    sqlx::query("UPDATE bookings SET confirmation_deadline = ? WHERE id = ?")
        .bind((Utc::now() - Duration::minutes(1)).naive_utc())
        .bind(booking_id)
        .execute(&app.pool)
        .await?;

    let err = svc.confirm(booking_id, app.car_owner).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    let err = svc.decline(booking_id, app.workshop_owner).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let status = svc
        .confirmation_status(booking_id, app.car_owner)
        .await?;
    assert_eq!(status.status, BookingStatus::Pending);
    assert!(!status.car_owner_confirmed);
    assert_eq!(status.remaining_seconds, 0);

    Ok(())
}

#[tokio::test]
async fn expiry_sweep_cancels_unconfirmed_bookings() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    // Only the car owner confirmed before the window closed.
    svc.confirm(booking_id, app.car_owner).await?;

    let after_window = Utc::now() + Duration::minutes(31);
    let expired = svc.expire_overdue(after_window).await?;
    assert_eq!(expired, 1);

    let status = svc
        .confirmation_status(booking_id, app.car_owner)
        .await?;
    assert_eq!(status.status, BookingStatus::Cancelled);

    // Neither confirm nor decline can move it afterwards.
    let err = svc.confirm(booking_id, app.workshop_owner).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));
    let err = svc.decline(booking_id, app.workshop_owner).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition { .. }));

    // The sweep is idempotent.
    assert_eq!(svc.expire_overdue(after_window).await?, 0);

    Ok(())
}

#[tokio::test]
async fn fully_confirmed_bookings_survive_the_sweep() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let svc = &app.context.booking_service;

    svc.confirm(booking_id, app.car_owner).await?;
    svc.confirm(booking_id, app.workshop_owner).await?;

    let expired = svc.expire_overdue(Utc::now() + Duration::hours(1)).await?;
    assert_eq!(expired, 0);

    let status = svc
        .confirmation_status(booking_id, app.car_owner)
        .await?;
    assert_eq!(status.status, BookingStatus::Confirmed);

    Ok(())
}
