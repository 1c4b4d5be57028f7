use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::MarketplaceConfig,
    domain::*,
    error::{AppError, Result},
    notifications::{Notification, NotificationDispatcher, NotificationKind},
    payments::PaymentGateway,
    repository::{BookingRepository, PaymentRepository},
};

/// Charges, commission splitting, refunds, and payout tracking.
pub struct SettlementService {
    payment_repo: Arc<dyn PaymentRepository>,
    booking_repo: Arc<dyn BookingRepository>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    dispatcher: Arc<NotificationDispatcher>,
    config: MarketplaceConfig,
}

impl SettlementService {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        dispatcher: Arc<NotificationDispatcher>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            payment_repo,
            booking_repo,
            gateway,
            dispatcher,
            config,
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>> {
        self.gateway
            .as_ref()
            .ok_or_else(|| AppError::Gateway("Payment gateway not configured".to_string()))
    }

    /// Creates a gateway intent for the booking's snapshot price and
    /// persists the Pending payment with its commission split. Returns the
    /// client secret for the client-side confirmation flow; the secret is
    /// handed to the caller and never logged.
    pub async fn create_payment_intent(&self, booking_id: i64) -> Result<PaymentIntentCreated> {
        let booking = self
            .booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        if booking.payment_method != PaymentMethod::CreditCard {
            return Err(AppError::Validation(
                "Booking is not payable by card".to_string(),
            ));
        }
        if matches!(
            booking.status,
            BookingStatus::Cancelled | BookingStatus::Rejected | BookingStatus::NoShow
        ) {
            return Err(AppError::Validation(
                "Booking is not in a chargeable state".to_string(),
            ));
        }
        if self
            .payment_repo
            .find_by_booking(booking_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "A payment already exists for this booking".to_string(),
            ));
        }

        let total_cents = booking.price_cents;
        let (commission_cents, workshop_cents) =
            split_amount(total_cents, self.config.commission_rate);

        let mut metadata = HashMap::new();
        metadata.insert("booking_id".to_string(), booking_id.to_string());

        let handle = self
            .gateway()?
            .create_intent(total_cents, &self.config.currency, metadata)
            .await?;

        let payment = self
            .payment_repo
            .create(NewPayment {
                booking_id,
                total_cents,
                commission_cents,
                workshop_cents,
                commission_rate: self.config.commission_rate,
                stripe_payment_intent_id: handle.intent_id,
            })
            .await?;

        tracing::info!(
            booking = booking_id,
            payment = payment.id,
            total = total_cents,
            commission = commission_cents,
            "Created payment intent"
        );

        Ok(PaymentIntentCreated {
            payment,
            client_secret: handle.client_secret,
        })
    }

    /// Webhook entry point for a settled charge. Idempotent: replayed
    /// events for an already-Succeeded payment return the record unchanged.
    pub async fn handle_payment_success(&self, intent_id: &str) -> Result<Payment> {
        let now = Utc::now();
        let settled = self.payment_repo.mark_succeeded(intent_id, now).await?;

        let payment = self
            .payment_repo
            .find_by_intent_id(intent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found for intent".to_string()))?;

        if !settled {
            return match payment.stripe_payment_status {
                StripePaymentStatus::Succeeded => Ok(payment),
                other => Err(AppError::Conflict(format!(
                    "Payment is {} and cannot be settled",
                    other.as_str()
                ))),
            };
        }

        self.booking_repo
            .set_paid(payment.booking_id, payment.total_cents)
            .await?;

        if let Some(parties) = self.booking_repo.find_parties(payment.booking_id).await? {
            self.notify(
                parties.car_owner_user_id,
                parties.workshop_owner_user_id,
                NotificationKind::PaymentSettled,
                format!("Payment settled for booking #{}", payment.booking_id),
                Some(payment.booking_id),
            )
            .await;
        }

        self.reload(payment.id).await
    }

    /// Webhook entry point for a failed charge. Tolerates replays and
    /// events for payments that already left Pending.
    pub async fn handle_payment_failure(&self, intent_id: &str) -> Result<()> {
        let marked = self.payment_repo.mark_failed(intent_id).await?;
        if marked {
            tracing::warn!(intent = intent_id, "Payment failed");
        }
        Ok(())
    }

    /// Full refund of the booking's settled payment, tied to cancellation.
    /// Refuses with `AlreadyPaidOut` once the workshop share has been
    /// disbursed; reconciliation after that point is a separate manual
    /// process.
    pub async fn refund_payment(&self, booking_id: i64) -> Result<Payment> {
        let payment = self
            .payment_repo
            .find_by_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found for booking".to_string()))?;

        if payment.is_paid_out {
            return Err(AppError::AlreadyPaidOut);
        }
        if payment.stripe_payment_status == StripePaymentStatus::Refunded {
            // A refund already went through; replaying is a no-op.
            return Ok(payment);
        }
        if payment.stripe_payment_status != StripePaymentStatus::Succeeded {
            return Err(AppError::Validation(
                "Only settled payments can be refunded".to_string(),
            ));
        }

        self.gateway()?
            .refund(&payment.stripe_payment_intent_id, None)
            .await?;

        let marked = self.payment_repo.mark_refunded(payment.id).await?;
        if !marked {
            let current = self.reload(payment.id).await?;
            if current.is_paid_out {
                return Err(AppError::AlreadyPaidOut);
            }
            if current.stripe_payment_status == StripePaymentStatus::Refunded {
                return Ok(current);
            }
            return Err(AppError::Conflict(
                "Payment state changed concurrently".to_string(),
            ));
        }

        if let Some(parties) = self.booking_repo.find_parties(booking_id).await? {
            self.notify(
                parties.workshop_owner_user_id,
                parties.car_owner_user_id,
                NotificationKind::PaymentSettled,
                format!("Payment for booking #{} was refunded", booking_id),
                Some(booking_id),
            )
            .await;
        }

        self.reload(payment.id).await
    }

    /// Settled payments on completed bookings still awaiting disbursement,
    /// oldest settlement first.
    pub async fn pending_payouts(&self) -> Result<Vec<PendingPayout>> {
        self.payment_repo.list_pending_payouts().await
    }

    /// Records the disbursement of the workshop share. Exactly-once: the
    /// conditional update refuses a second marking attempt, including the
    /// loser of a concurrent race.
    pub async fn mark_paid_out(
        &self,
        payment_id: i64,
        request: MarkPaidOutRequest,
    ) -> Result<Payment> {
        let method = PayoutMethod::parse(&request.payout_method)?;

        let payment = self.reload(payment_id).await?;
        if payment.is_paid_out {
            return Err(AppError::AlreadyPaidOut);
        }
        if payment.stripe_payment_status != StripePaymentStatus::Succeeded {
            return Err(AppError::Validation(
                "Only settled payments can be paid out".to_string(),
            ));
        }

        let booking = self
            .booking_repo
            .find_by_id(payment.booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
        if booking.status != BookingStatus::Completed {
            return Err(AppError::Validation(
                "Booking must be completed before payout".to_string(),
            ));
        }

        let marked = self
            .payment_repo
            .mark_paid_out(
                payment_id,
                method,
                request.payout_reference,
                request.payout_notes,
                Utc::now(),
            )
            .await?;
        if !marked {
            // Race loser: either someone else marked it, or a refund landed
            // between our read and the conditional update.
            let current = self.reload(payment_id).await?;
            if current.is_paid_out {
                return Err(AppError::AlreadyPaidOut);
            }
            return Err(AppError::Conflict(
                "Payment state changed concurrently".to_string(),
            ));
        }

        if let Some(parties) = self.booking_repo.find_parties(payment.booking_id).await? {
            self.notify(
                parties.car_owner_user_id,
                parties.workshop_owner_user_id,
                NotificationKind::PayoutSent,
                format!(
                    "Payout of {} cents sent for booking #{}",
                    payment.workshop_cents, payment.booking_id
                ),
                Some(payment.booking_id),
            )
            .await;
        }

        self.reload(payment_id).await
    }

    async fn reload(&self, payment_id: i64) -> Result<Payment> {
        self.payment_repo
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
    }

    async fn notify(
        &self,
        sender: i64,
        receiver: i64,
        kind: NotificationKind,
        message: String,
        booking_id: Option<i64>,
    ) {
        self.dispatcher
            .notify(Notification {
                sender_user_id: sender,
                receiver_user_id: receiver,
                message,
                kind,
                booking_id,
                sent_at: Utc::now(),
            })
            .await;
    }
}

/// Commission split in integer cents. The commission is rounded to the
/// nearest cent; the workshop share is the remainder, so the two always
/// sum back to the total exactly.
pub fn split_amount(total_cents: i64, commission_rate: f64) -> (i64, i64) {
    let commission = (total_cents as f64 * commission_rate).round() as i64;
    let commission = commission.clamp(0, total_cents);
    (commission, total_cents - commission)
}

#[cfg(test)]
mod tests {
    use super::split_amount;

    #[test]
    fn split_matches_the_documented_example() {
        // 100.00 at 12% -> 12.00 commission, 88.00 workshop share.
        let (commission, workshop) = split_amount(10_000, 0.12);
        assert_eq!(commission, 1_200);
        assert_eq!(workshop, 8_800);
    }

    #[test]
    fn split_sums_exactly_for_awkward_amounts() {
        for total in [1, 3, 99, 101, 12_345, 99_999, 1_000_001] {
            for rate in [0.0, 0.075, 0.1, 0.12, 0.125, 0.333, 0.5, 0.99, 1.0] {
                let (commission, workshop) = split_amount(total, rate);
                assert_eq!(commission + workshop, total, "total={} rate={}", total, rate);
                assert!(commission >= 0 && workshop >= 0);
            }
        }
    }

    #[test]
    fn zero_total_splits_to_zero() {
        assert_eq!(split_amount(0, 0.12), (0, 0));
    }
}
