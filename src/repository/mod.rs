use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::*;
use crate::error::Result;

pub mod booking_repository;
pub mod payment_repository;

pub use booking_repository::SqliteBookingRepository;
pub use payment_repository::SqlitePaymentRepository;

/// Persistence for bookings and their confirmation/timing fields. Mutating
/// methods that race (status moves, confirmation flags) are conditional
/// updates: they return `false` when the expected pre-state was gone, and
/// callers decide whether that is a benign no-op or a conflict.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create(&self, new: NewBooking) -> Result<Booking>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Booking>>;
    /// Resolves the two user ids that are party to the booking.
    async fn find_parties(&self, id: i64) -> Result<Option<BookingParties>>;
    /// Atomic `status = to WHERE id = ? AND status = from`. `false` means a
    /// concurrent writer got there first.
    async fn update_status(&self, id: i64, from: BookingStatus, to: BookingStatus) -> Result<bool>;
    /// Sets the party's confirmation flag while the booking is still
    /// Pending. Idempotent per flag; `false` when the booking already left
    /// Pending.
    async fn set_confirmation_flag(&self, id: i64, role: ActorRole) -> Result<bool>;
    /// Flips the booking to Paid and records the settled amount.
    async fn set_paid(&self, id: i64, amount_cents: i64) -> Result<()>;
    /// Pending bookings whose confirmation deadline has passed without both
    /// flags set. Input to the expiry sweep.
    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<Booking>>;

    // Reference lookups (catalog data owned by the out-of-scope CRUD layer).
    async fn find_car_owner(&self, car_id: i64) -> Result<Option<i64>>;
    async fn find_service_snapshot(&self, service_id: i64) -> Result<Option<ServiceSnapshot>>;
}

/// Persistence for payments, keyed uniquely by gateway intent id and by
/// booking id.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, new: NewPayment) -> Result<Payment>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>>;
    async fn find_by_booking(&self, booking_id: i64) -> Result<Option<Payment>>;
    async fn find_by_intent_id(&self, intent_id: &str) -> Result<Option<Payment>>;
    /// Pending -> Succeeded, stamping `paid_at`. `false` when the payment was
    /// not Pending (already settled, failed, or unknown intent).
    async fn mark_succeeded(&self, intent_id: &str, paid_at: DateTime<Utc>) -> Result<bool>;
    /// Pending -> Failed. `false` when the payment was not Pending.
    async fn mark_failed(&self, intent_id: &str) -> Result<bool>;
    /// Succeeded -> Refunded, refused once the payout went out. `false` when
    /// the conditional update matched nothing.
    async fn mark_refunded(&self, id: i64) -> Result<bool>;
    /// The single most safety-critical write in the system:
    /// `SET is_paid_out = 1 WHERE id = ? AND is_paid_out = 0`. The
    /// rows-affected check is what rejects the loser of a double-payout race.
    async fn mark_paid_out(
        &self,
        id: i64,
        method: PayoutMethod,
        reference: Option<String>,
        notes: Option<String>,
        payout_date: DateTime<Utc>,
    ) -> Result<bool>;
    /// Succeeded, not paid out, booking Completed; oldest `paid_at` first.
    async fn list_pending_payouts(&self) -> Result<Vec<PendingPayout>>;
}
