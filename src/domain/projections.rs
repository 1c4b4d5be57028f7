use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{Booking, BookingStatus, Payment};

/// Read-only view of the dual-confirmation window, served to either party
/// of the booking.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationStatus {
    pub booking_id: i64,
    pub status: BookingStatus,
    pub car_owner_confirmed: bool,
    pub workshop_owner_confirmed: bool,
    pub confirmation_sent_at: Option<DateTime<Utc>>,
    pub confirmation_deadline: Option<DateTime<Utc>>,
    pub remaining_seconds: i64,
}

impl ConfirmationStatus {
    pub fn project(booking: &Booking, now: DateTime<Utc>) -> Self {
        let remaining_seconds = booking
            .confirmation_deadline
            .map(|deadline| (deadline - now).num_seconds().max(0))
            .unwrap_or(0);
        Self {
            booking_id: booking.id,
            status: booking.status,
            car_owner_confirmed: booking.car_owner_confirmed,
            workshop_owner_confirmed: booking.workshop_owner_confirmed,
            confirmation_sent_at: booking.confirmation_sent_at,
            confirmation_deadline: booking.confirmation_deadline,
            remaining_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeStatus {
    pub booking_id: i64,
    pub status: BookingStatus,
    pub appointment_date: DateTime<Utc>,
    pub seconds_until_arrival: i64,
    pub has_arrived: bool,
    pub can_still_change_response: bool,
}

impl TimeStatus {
    pub fn project(booking: &Booking, now: DateTime<Utc>) -> Self {
        let seconds_until_arrival = (booking.appointment_date - now).num_seconds();
        let has_arrived = seconds_until_arrival <= 0;
        let can_still_change_response = !has_arrived
            && matches!(booking.status, BookingStatus::Pending | BookingStatus::Rejected);
        Self {
            booking_id: booking.id,
            status: booking.status,
            appointment_date: booking.appointment_date,
            seconds_until_arrival,
            has_arrived,
            can_still_change_response,
        }
    }
}

/// A settled payment awaiting disbursement, enriched with the display data
/// the operator payout screen needs.
#[derive(Debug, Clone, Serialize)]
pub struct PendingPayout {
    pub payment: Payment,
    pub booking_id: i64,
    pub appointment_date: DateTime<Utc>,
    pub workshop_name: String,
    pub service_name: String,
    pub car_owner_name: String,
}
