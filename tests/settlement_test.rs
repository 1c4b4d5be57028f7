mod common;

use garagelink::{
    domain::{MarkPaidOutRequest, StripePaymentStatus},
    error::AppError,
    repository::{BookingRepository, PaymentRepository},
};

fn payout_request(method: &str, reference: Option<&str>) -> MarkPaidOutRequest {
    MarkPaidOutRequest {
        payout_method: method.to_string(),
        payout_reference: reference.map(String::from),
        payout_notes: None,
    }
}

#[tokio::test]
async fn intent_splits_commission_exactly() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;

    let created = app
        .context
        .settlement_service
        .create_payment_intent(booking_id)
        .await?;

    // 100.00 at the default 12% rate.
    assert_eq!(created.payment.total_cents, 10_000);
    assert_eq!(created.payment.commission_cents, 1_200);
    assert_eq!(created.payment.workshop_cents, 8_800);
    assert_eq!(created.payment.commission_rate, 0.12);
    assert_eq!(
        created.payment.stripe_payment_status,
        StripePaymentStatus::Pending
    );
    assert!(!created.client_secret.is_empty());

    Ok(())
}

#[tokio::test]
async fn awkward_totals_still_sum_to_the_cent() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.oil_service_id).await?;

    let created = app
        .context
        .settlement_service
        .create_payment_intent(booking_id)
        .await?;

    // 49.99 at 12% rounds the commission to 6.00; the workshop share is
    // the remainder, never an independently rounded figure.
    assert_eq!(created.payment.total_cents, 4_999);
    assert_eq!(created.payment.commission_cents, 600);
    assert_eq!(created.payment.workshop_cents, 4_399);
    assert_eq!(
        created.payment.commission_cents + created.payment.workshop_cents,
        created.payment.total_cents
    );

    Ok(())
}

#[tokio::test]
async fn one_payment_per_booking() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;

    app.context
        .settlement_service
        .create_payment_intent(booking_id)
        .await?;
    let err = app
        .context
        .settlement_service
        .create_payment_intent(booking_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    Ok(())
}

#[tokio::test]
async fn payment_success_is_idempotent() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    let created = settlement.create_payment_intent(booking_id).await?;
    let intent_id = created.payment.stripe_payment_intent_id.clone();

    let settled = settlement.handle_payment_success(&intent_id).await?;
    assert_eq!(settled.stripe_payment_status, StripePaymentStatus::Succeeded);
    assert!(settled.paid_at.is_some());

    let booking = app
        .context
        .booking_repo
        .find_by_id(booking_id)
        .await?
        .unwrap();
    assert_eq!(
        booking.payment_status,
        garagelink::domain::BookingPaymentStatus::Paid
    );
    assert_eq!(booking.paid_amount_cents, Some(10_000));

    // A replayed webhook returns the record unchanged.
    let replayed = settlement.handle_payment_success(&intent_id).await?;
    assert_eq!(replayed.paid_at, settled.paid_at);
    assert_eq!(replayed.stripe_payment_status, StripePaymentStatus::Succeeded);

    Ok(())
}

#[tokio::test]
async fn unknown_intent_is_not_found() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let err = app
        .context
        .settlement_service
        .handle_payment_success("pi_unknown")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}

#[tokio::test]
async fn payout_marks_exactly_once() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    let created = settlement.create_payment_intent(booking_id).await?;
    settlement
        .handle_payment_success(&created.payment.stripe_payment_intent_id)
        .await?;
    app.drive_to_completed(booking_id).await?;

    let pending = settlement.pending_payouts().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].workshop_name, "Reyes Auto Care");
    assert_eq!(pending[0].service_name, "Brake pad replacement");
    assert_eq!(pending[0].car_owner_name, "Dana Fields");

    let paid = settlement
        .mark_paid_out(
            created.payment.id,
            payout_request("BankTransfer", Some("REF123")),
        )
        .await?;
    assert!(paid.is_paid_out);
    assert!(paid.payout_date.is_some());
    assert_eq!(paid.payout_reference.as_deref(), Some("REF123"));

    // The second identical call must fail: no double payouts.
    let err = settlement
        .mark_paid_out(
            created.payment.id,
            payout_request("BankTransfer", Some("REF123")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyPaidOut));

    assert!(settlement.pending_payouts().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn pending_payouts_are_oldest_settlement_first() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let settlement = &app.context.settlement_service;

    let first = app.create_card_booking(app.brake_service_id).await?;
    let second = app.create_card_booking(app.oil_service_id).await?;

    let first_intent = settlement.create_payment_intent(first).await?;
    let second_intent = settlement.create_payment_intent(second).await?;

    // Settle the second booking's payment first.
    settlement
        .handle_payment_success(&second_intent.payment.stripe_payment_intent_id)
        .await?;
    settlement
        .handle_payment_success(&first_intent.payment.stripe_payment_intent_id)
        .await?;

    app.drive_to_completed(first).await?;
    app.drive_to_completed(second).await?;

    let pending = settlement.pending_payouts().await?;
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].booking_id, second);
    assert_eq!(pending[1].booking_id, first);

    Ok(())
}

#[tokio::test]
async fn payout_requires_known_method_and_completed_booking() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    let created = settlement.create_payment_intent(booking_id).await?;
    settlement
        .handle_payment_success(&created.payment.stripe_payment_intent_id)
        .await?;

    let err = settlement
        .mark_paid_out(created.payment.id, payout_request("Barter", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Booking still in its early lifecycle: no payout yet.
    let err = settlement
        .mark_paid_out(created.payment.id, payout_request("BankTransfer", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn refund_flows_through_the_gateway_once() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    let created = settlement.create_payment_intent(booking_id).await?;
    settlement
        .handle_payment_success(&created.payment.stripe_payment_intent_id)
        .await?;

    let refunded = settlement.refund_payment(booking_id).await?;
    assert_eq!(refunded.stripe_payment_status, StripePaymentStatus::Refunded);
    assert_eq!(app.gateway.refund_count(), 1);

    // Replaying the refund is a no-op, not a second gateway call.
    let replayed = settlement.refund_payment(booking_id).await?;
    assert_eq!(replayed.stripe_payment_status, StripePaymentStatus::Refunded);
    assert_eq!(app.gateway.refund_count(), 1);

    Ok(())
}

#[tokio::test]
async fn refund_is_refused_after_payout() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    let created = settlement.create_payment_intent(booking_id).await?;
    settlement
        .handle_payment_success(&created.payment.stripe_payment_intent_id)
        .await?;
    app.drive_to_completed(booking_id).await?;
    settlement
        .mark_paid_out(created.payment.id, payout_request("Stripe", None))
        .await?;

    let err = settlement.refund_payment(booking_id).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyPaidOut));

    // The charge status is untouched and no gateway refund happened.
    let payment = app
        .context
        .payment_repo
        .find_by_id(created.payment.id)
        .await?
        .unwrap();
    assert_eq!(payment.stripe_payment_status, StripePaymentStatus::Succeeded);
    assert_eq!(app.gateway.refund_count(), 0);

    Ok(())
}

#[tokio::test]
async fn refunded_payments_are_never_marked_paid_out() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    let created = settlement.create_payment_intent(booking_id).await?;
    settlement
        .handle_payment_success(&created.payment.stripe_payment_intent_id)
        .await?;
    app.drive_to_completed(booking_id).await?;

    // Refund directly at the store, emulating a refund landing between a
    // payout caller's read and its conditional update.
    assert!(app.context.payment_repo.mark_refunded(created.payment.id).await?);

    let marked = app
        .context
        .payment_repo
        .mark_paid_out(
            created.payment.id,
            garagelink::domain::PayoutMethod::BankTransfer,
            None,
            None,
            chrono::Utc::now(),
        )
        .await?;
    assert!(!marked, "a refunded payment must not be disbursed");

    let payment = app
        .context
        .payment_repo
        .find_by_id(created.payment.id)
        .await?
        .unwrap();
    assert_eq!(payment.stripe_payment_status, StripePaymentStatus::Refunded);
    assert!(!payment.is_paid_out);
    assert!(payment.payout_date.is_none());

    Ok(())
}

#[tokio::test]
async fn unsettled_payments_cannot_be_refunded() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    settlement.create_payment_intent(booking_id).await?;

    let err = settlement.refund_payment(booking_id).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(app.gateway.refund_count(), 0);

    Ok(())
}

#[tokio::test]
async fn gateway_refund_failure_leaves_payment_settled() -> anyhow::Result<()> {
    let app = common::setup().await?;
    let booking_id = app.create_card_booking(app.brake_service_id).await?;
    let settlement = &app.context.settlement_service;

    let created = settlement.create_payment_intent(booking_id).await?;
    settlement
        .handle_payment_success(&created.payment.stripe_payment_intent_id)
        .await?;

    app.gateway.fail_refunds(true);
    let err = settlement.refund_payment(booking_id).await.unwrap_err();
    assert!(matches!(err, AppError::Gateway(_)));
    assert!(err.is_retryable());

    let payment = app
        .context
        .payment_repo
        .find_by_id(created.payment.id)
        .await?
        .unwrap();
    assert_eq!(payment.stripe_payment_status, StripePaymentStatus::Succeeded);

    // The retry succeeds once the provider recovers.
    app.gateway.fail_refunds(false);
    let refunded = settlement.refund_payment(booking_id).await?;
    assert_eq!(refunded.stripe_payment_status, StripePaymentStatus::Refunded);

    Ok(())
}

#[tokio::test]
async fn cash_bookings_get_no_payment_intent() -> anyhow::Result<()> {
    let app = common::setup().await?;

    let booking = app
        .context
        .booking_service
        .create_booking(
            app.car_owner,
            garagelink::domain::CreateBookingRequest {
                car_id: app.car_id,
                workshop_service_id: app.brake_service_id,
                appointment_date: chrono::Utc::now() + chrono::Duration::hours(2),
                payment_method: garagelink::domain::PaymentMethod::Cash,
            },
        )
        .await?;

    let err = app
        .context
        .settlement_service
        .create_payment_intent(booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    Ok(())
}
