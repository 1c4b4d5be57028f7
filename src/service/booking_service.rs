use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    config::MarketplaceConfig,
    domain::*,
    error::{AppError, Result},
    notifications::{Notification, NotificationDispatcher, NotificationKind},
    repository::{BookingRepository, PaymentRepository},
};

/// Sender id used on notifications produced by internal paths (expiry
/// sweep, settlement events).
const SYSTEM_USER_ID: i64 = 0;

/// Outcome of an expired, not-fully-confirmed booking. Cancelled rather
/// than Rejected: Rejected is reserved for an explicit decline by a party.
const EXPIRY_OUTCOME: BookingStatus = BookingStatus::Cancelled;

/// Who is requesting a transition. `System` is only ever constructed by
/// internal callers; HTTP requests always arrive as `User`.
#[derive(Debug, Clone, Copy)]
pub enum TransitionActor {
    User(i64),
    System,
}

/// The booking state machine and the dual-confirmation protocol.
pub struct BookingService {
    booking_repo: Arc<dyn BookingRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    dispatcher: Arc<NotificationDispatcher>,
    config: MarketplaceConfig,
}

impl BookingService {
    pub fn new(
        booking_repo: Arc<dyn BookingRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        dispatcher: Arc<NotificationDispatcher>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            booking_repo,
            payment_repo,
            dispatcher,
            config,
        }
    }

    pub async fn create_booking(
        &self,
        owner_user_id: i64,
        request: CreateBookingRequest,
    ) -> Result<Booking> {
        let now = Utc::now();
        if request.appointment_date <= now {
            return Err(AppError::Validation(
                "Appointment date must be in the future".to_string(),
            ));
        }

        let car_owner = self
            .booking_repo
            .find_car_owner(request.car_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Car not found".to_string()))?;
        if car_owner != owner_user_id {
            return Err(AppError::Unauthorized);
        }

        let snapshot = self
            .booking_repo
            .find_service_snapshot(request.workshop_service_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Workshop service not found".to_string()))?;

        let window = Duration::minutes(self.config.confirmation_window_minutes);
        let booking = self
            .booking_repo
            .create(NewBooking {
                car_id: request.car_id,
                workshop_profile_id: snapshot.workshop_profile_id,
                workshop_service_id: request.workshop_service_id,
                price_cents: snapshot.price_cents,
                duration_minutes: snapshot.duration_minutes,
                appointment_date: request.appointment_date,
                payment_method: request.payment_method,
                confirmation_sent_at: now,
                confirmation_deadline: now + window,
            })
            .await?;

        if let Some(parties) = self.booking_repo.find_parties(booking.id).await? {
            self.notify(
                owner_user_id,
                parties.workshop_owner_user_id,
                NotificationKind::BookingCreated,
                format!("New booking request #{}", booking.id),
                Some(booking.id),
            )
            .await;
        }

        Ok(booking)
    }

    /// Records the acting party's confirmation. Idempotent: a repeat call
    /// by the same role leaves the flags exactly as one call would. When
    /// the second flag lands, the booking moves Pending -> Confirmed.
    pub async fn confirm(&self, booking_id: i64, actor_user_id: i64) -> Result<Booking> {
        let now = Utc::now();
        let (booking, parties, role) = self.load_as_party(booking_id, actor_user_id).await?;

        let already_confirmed_by_role = match role {
            ActorRole::CarOwner => booking.car_owner_confirmed,
            ActorRole::Workshop => booking.workshop_owner_confirmed,
            ActorRole::System => false,
        };

        if booking.status != BookingStatus::Pending {
            // Re-confirming after the window resolved is a no-op only if
            // this party's flag is already in.
            if already_confirmed_by_role {
                return Ok(booking);
            }
            return Err(AppError::InvalidTransition {
                from: booking.status.as_str().to_string(),
                to: BookingStatus::Confirmed.as_str().to_string(),
            });
        }

        if !booking.confirmation_window_open(now) {
            return Err(AppError::Validation(
                "Confirmation window has closed".to_string(),
            ));
        }

        self.booking_repo
            .set_confirmation_flag(booking_id, role)
            .await?;

        let booking = self.reload(booking_id).await?;
        if booking.status == BookingStatus::Pending && booking.both_parties_confirmed() {
            let moved = self
                .booking_repo
                .update_status(booking_id, BookingStatus::Pending, BookingStatus::Confirmed)
                .await?;
            if moved {
                self.notify_both(
                    &parties,
                    NotificationKind::BookingStatusChanged,
                    format!("Booking #{} is confirmed", booking_id),
                    Some(booking_id),
                )
                .await;
            }
            // A race loser here is benign: the winner applied the same edge.
        }

        self.reload(booking_id).await
    }

    /// Rejects the booking outright, independent of the other party's flag.
    pub async fn decline(&self, booking_id: i64, actor_user_id: i64) -> Result<Booking> {
        let now = Utc::now();
        let (booking, parties, role) = self.load_as_party(booking_id, actor_user_id).await?;

        if booking.status == BookingStatus::Rejected {
            return Ok(booking);
        }
        if booking.status != BookingStatus::Pending {
            return Err(AppError::InvalidTransition {
                from: booking.status.as_str().to_string(),
                to: BookingStatus::Rejected.as_str().to_string(),
            });
        }
        if !booking.confirmation_window_open(now) {
            return Err(AppError::Validation(
                "Confirmation window has closed".to_string(),
            ));
        }

        let moved = self
            .booking_repo
            .update_status(booking_id, BookingStatus::Pending, BookingStatus::Rejected)
            .await?;
        if !moved {
            let current = self.reload(booking_id).await?;
            if current.status == BookingStatus::Rejected {
                return Ok(current);
            }
            return Err(AppError::Conflict(
                "Booking status changed concurrently".to_string(),
            ));
        }

        let receiver = match role {
            ActorRole::CarOwner => parties.workshop_owner_user_id,
            _ => parties.car_owner_user_id,
        };
        self.notify(
            actor_user_id,
            receiver,
            NotificationKind::BookingStatusChanged,
            format!("Booking #{} was declined", booking_id),
            Some(booking_id),
        )
        .await;

        self.reload(booking_id).await
    }

    /// Validates and applies a status transition: structural edge check,
    /// appointment-date and confirmation guards, then role rights, then a
    /// single conditional update so concurrent requests cannot double-apply.
    pub async fn transition(
        &self,
        booking_id: i64,
        requested: BookingStatus,
        actor: TransitionActor,
    ) -> Result<Booking> {
        let now = Utc::now();
        let booking = self.reload(booking_id).await?;
        let parties = self
            .booking_repo
            .find_parties(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        let role = match actor {
            TransitionActor::System => ActorRole::System,
            TransitionActor::User(user_id) => {
                parties.role_of(user_id).ok_or(AppError::Unauthorized)?
            }
        };

        let from = booking.status;
        if !from.can_transition_to(requested) {
            return Err(AppError::InvalidTransition {
                from: from.as_str().to_string(),
                to: requested.as_str().to_string(),
            });
        }

        // Cancellation closes at the appointment time for the parties; the
        // system path (expiry sweep) is exempt.
        if requested == BookingStatus::Cancelled
            && role != ActorRole::System
            && now >= booking.appointment_date
        {
            return Err(AppError::InvalidTransition {
                from: from.as_str().to_string(),
                to: requested.as_str().to_string(),
            });
        }

        // Pending -> Confirmed needs both flags unless the system drives it.
        if requested == BookingStatus::Confirmed
            && role != ActorRole::System
            && !booking.both_parties_confirmed()
        {
            return Err(AppError::InvalidTransition {
                from: from.as_str().to_string(),
                to: requested.as_str().to_string(),
            });
        }

        if !role_allows(role, from, requested) {
            return Err(AppError::Unauthorized);
        }

        let moved = self
            .booking_repo
            .update_status(booking_id, from, requested)
            .await?;
        if !moved {
            return Err(AppError::Conflict(
                "Booking status changed concurrently".to_string(),
            ));
        }

        if requested == BookingStatus::Completed {
            self.check_settlement_eligibility(booking_id).await;
        }

        self.notify_both(
            &parties,
            NotificationKind::BookingStatusChanged,
            format!(
                "Booking #{} moved from {} to {}",
                booking_id,
                from.as_str(),
                requested.as_str()
            ),
            Some(booking_id),
        )
        .await;

        self.reload(booking_id).await
    }

    pub async fn confirmation_status(
        &self,
        booking_id: i64,
        requester_user_id: i64,
    ) -> Result<ConfirmationStatus> {
        let (booking, _, _) = self.load_as_party(booking_id, requester_user_id).await?;
        Ok(ConfirmationStatus::project(&booking, Utc::now()))
    }

    pub async fn time_status(&self, booking_id: i64, requester_user_id: i64) -> Result<TimeStatus> {
        let (booking, _, _) = self.load_as_party(booking_id, requester_user_id).await?;
        Ok(TimeStatus::project(&booking, Utc::now()))
    }

    /// Sweep body: every Pending booking past its confirmation deadline
    /// without both flags set gets resolved by the system actor. Returns
    /// how many bookings were expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<usize> {
        let overdue = self.booking_repo.list_expired_pending(now).await?;
        let mut expired = 0;

        for booking in overdue {
            let moved = self
                .booking_repo
                .update_status(booking.id, BookingStatus::Pending, EXPIRY_OUTCOME)
                .await?;
            if !moved {
                // Someone confirmed or cancelled between the list and the
                // update; leave it alone.
                continue;
            }
            expired += 1;

            if let Some(parties) = self.booking_repo.find_parties(booking.id).await? {
                self.notify_both(
                    &parties,
                    NotificationKind::BookingStatusChanged,
                    format!(
                        "Booking #{} expired unconfirmed and was cancelled",
                        booking.id
                    ),
                    Some(booking.id),
                )
                .await;
            }
        }

        Ok(expired)
    }

    async fn reload(&self, booking_id: i64) -> Result<Booking> {
        self.booking_repo
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))
    }

    /// Loads the booking and authorizes the requester as one of its two
    /// parties.
    async fn load_as_party(
        &self,
        booking_id: i64,
        user_id: i64,
    ) -> Result<(Booking, BookingParties, ActorRole)> {
        let booking = self.reload(booking_id).await?;
        let parties = self
            .booking_repo
            .find_parties(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;
        let role = parties.role_of(user_id).ok_or(AppError::Unauthorized)?;
        Ok((booking, parties, role))
    }

    /// Completion does not create a payout by itself; it only checks (and
    /// logs) whether a settled payment is waiting for one.
    async fn check_settlement_eligibility(&self, booking_id: i64) {
        match self.payment_repo.find_by_booking(booking_id).await {
            Ok(Some(payment))
                if payment.stripe_payment_status == StripePaymentStatus::Succeeded =>
            {
                tracing::info!(
                    booking = booking_id,
                    payment = payment.id,
                    "Completed booking has a settled payment awaiting payout"
                );
            }
            Ok(_) => {
                tracing::info!(
                    booking = booking_id,
                    "Completed booking has no settled card payment"
                );
            }
            Err(e) => {
                tracing::error!(
                    booking = booking_id,
                    "Settlement eligibility check failed: {:?}",
                    e
                );
            }
        }
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

    async fn notify_both(
        &self,
        parties: &BookingParties,
        kind: NotificationKind,
        message: String,
        booking_id: Option<i64>,
    ) {
        self.notify(
            SYSTEM_USER_ID,
            parties.car_owner_user_id,
            kind,
            message.clone(),
            booking_id,
        )
        .await;
        self.notify(
            SYSTEM_USER_ID,
            parties.workshop_owner_user_id,
            kind,
            message,
            booking_id,
        )
        .await;
    }
}

/// Which lifecycle edges each role may drive. The system actor may drive
/// any structurally valid edge.
fn role_allows(role: ActorRole, from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    match role {
        ActorRole::System => true,
        ActorRole::CarOwner => matches!(
            (from, to),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (InProgress, Cancelled)
                | (ReadyForPickup, Completed)
        ),
        ActorRole::Workshop => matches!(
            (from, to),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
                | (InProgress, ReadyForPickup)
                | (InProgress, Cancelled)
                | (ReadyForPickup, Completed)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_workshop_moves_work_to_ready_for_pickup() {
        assert!(role_allows(
            ActorRole::Workshop,
            BookingStatus::InProgress,
            BookingStatus::ReadyForPickup
        ));
        assert!(!role_allows(
            ActorRole::CarOwner,
            BookingStatus::InProgress,
            BookingStatus::ReadyForPickup
        ));
    }

    #[test]
    fn system_may_drive_any_edge() {
        assert!(role_allows(
            ActorRole::System,
            BookingStatus::Pending,
            BookingStatus::Cancelled
        ));
        assert!(role_allows(
            ActorRole::System,
            BookingStatus::Confirmed,
            BookingStatus::NoShow
        ));
    }

    #[test]
    fn car_owner_cannot_flag_no_show() {
        assert!(!role_allows(
            ActorRole::CarOwner,
            BookingStatus::Confirmed,
            BookingStatus::NoShow
        ));
    }
}
