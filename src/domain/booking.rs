use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub car_id: i64,
    pub workshop_profile_id: i64,
    pub workshop_service_id: i64,
    /// Snapshot of the service price at booking time. Catalog edits after
    /// creation never reprice an existing booking.
    pub price_cents: i64,
    pub duration_minutes: i64,
    pub status: BookingStatus,
    pub appointment_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub payment_status: BookingPaymentStatus,
    pub paid_amount_cents: Option<i64>,
    pub car_owner_confirmed: bool,
    pub workshop_owner_confirmed: bool,
    pub confirmation_sent_at: Option<DateTime<Utc>>,
    pub confirmation_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn both_parties_confirmed(&self) -> bool {
        self.car_owner_confirmed && self.workshop_owner_confirmed
    }

    pub fn confirmation_window_open(&self, now: DateTime<Utc>) -> bool {
        self.confirmation_deadline
            .map(|deadline| now < deadline)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    ReadyForPickup,
    Completed,
    Cancelled,
    Rejected,
    NoShow,
}

impl BookingStatus {
    /// Terminal states admit no further transition, ever.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed
                | BookingStatus::Cancelled
                | BookingStatus::Rejected
                | BookingStatus::NoShow
        )
    }

    /// The directed edge set of the lifecycle. Everything not listed here
    /// is rejected, so a booking can never reach a status unreachable from
    /// Pending.
    pub fn can_transition_to(&self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Confirmed, InProgress)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
                | (InProgress, ReadyForPickup)
                | (InProgress, Cancelled)
                | (ReadyForPickup, Completed)
        )
    }

    /// Stable string encoding, used both for persistence and on the wire.
    /// Never persist these by ordinal.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "Pending",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::InProgress => "InProgress",
            BookingStatus::ReadyForPickup => "ReadyForPickup",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
            BookingStatus::Rejected => "Rejected",
            BookingStatus::NoShow => "NoShow",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(BookingStatus::Pending),
            "Confirmed" => Ok(BookingStatus::Confirmed),
            "InProgress" => Ok(BookingStatus::InProgress),
            "ReadyForPickup" => Ok(BookingStatus::ReadyForPickup),
            "Completed" => Ok(BookingStatus::Completed),
            "Cancelled" => Ok(BookingStatus::Cancelled),
            "Rejected" => Ok(BookingStatus::Rejected),
            "NoShow" => Ok(BookingStatus::NoShow),
            _ => Err(AppError::Validation(format!("Unknown booking status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    CreditCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::CreditCard => "CreditCard",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Cash" => Ok(PaymentMethod::Cash),
            "CreditCard" => Ok(PaymentMethod::CreditCard),
            _ => Err(AppError::Validation(format!("Unknown payment method: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BookingPaymentStatus {
    Unpaid,
    Paid,
}

impl BookingPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingPaymentStatus::Unpaid => "Unpaid",
            BookingPaymentStatus::Paid => "Paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Unpaid" => Ok(BookingPaymentStatus::Unpaid),
            "Paid" => Ok(BookingPaymentStatus::Paid),
            _ => Err(AppError::Validation(format!("Unknown payment status: {}", s))),
        }
    }
}

/// Who is driving an operation. CarOwner and Workshop are resolved from the
/// booking's parties; System is reserved for internal paths (expiry sweep,
/// webhook processing) and never derived from a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActorRole {
    CarOwner,
    Workshop,
    System,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub car_id: i64,
    pub workshop_service_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
}

/// Fully resolved insert payload: snapshots taken, confirmation window
/// stamped. Built by the booking service, consumed by the repository.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub car_id: i64,
    pub workshop_profile_id: i64,
    pub workshop_service_id: i64,
    pub price_cents: i64,
    pub duration_minutes: i64,
    pub appointment_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub confirmation_sent_at: DateTime<Utc>,
    pub confirmation_deadline: DateTime<Utc>,
}

/// The two user ids authorized to act on a booking.
#[derive(Debug, Clone, Copy)]
pub struct BookingParties {
    pub car_owner_user_id: i64,
    pub workshop_owner_user_id: i64,
}

impl BookingParties {
    pub fn role_of(&self, user_id: i64) -> Option<ActorRole> {
        if user_id == self.car_owner_user_id {
            Some(ActorRole::CarOwner)
        } else if user_id == self.workshop_owner_user_id {
            Some(ActorRole::Workshop)
        } else {
            None
        }
    }
}

/// Price/duration of a catalog service at lookup time, copied onto the
/// booking so the charge amount is fixed from creation.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    pub workshop_profile_id: i64,
    pub price_cents: i64,
    pub duration_minutes: i64,
}
