use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// One-to-one with a booking that reached a chargeable state. Amounts are
/// integer cents; the split invariant `total = commission + workshop` holds
/// exactly because the workshop share is computed by subtraction, never by a
/// second rounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub total_cents: i64,
    pub commission_cents: i64,
    pub workshop_cents: i64,
    /// Rate snapshotted at creation; never retroactively recalculated.
    pub commission_rate: f64,
    pub stripe_payment_status: StripePaymentStatus,
    pub stripe_payment_intent_id: String,
    pub is_paid_out: bool,
    pub payout_date: Option<DateTime<Utc>>,
    pub payout_method: Option<PayoutMethod>,
    pub payout_reference: Option<String>,
    pub payout_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StripePaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl StripePaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StripePaymentStatus::Pending => "Pending",
            StripePaymentStatus::Succeeded => "Succeeded",
            StripePaymentStatus::Failed => "Failed",
            StripePaymentStatus::Refunded => "Refunded",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(StripePaymentStatus::Pending),
            "Succeeded" => Ok(StripePaymentStatus::Succeeded),
            "Failed" => Ok(StripePaymentStatus::Failed),
            "Refunded" => Ok(StripePaymentStatus::Refunded),
            _ => Err(AppError::Validation(format!("Unknown payment status: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PayoutMethod {
    BankTransfer,
    Cash,
    Check,
    Stripe,
    Other,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::BankTransfer => "BankTransfer",
            PayoutMethod::Cash => "Cash",
            PayoutMethod::Check => "Check",
            PayoutMethod::Stripe => "Stripe",
            PayoutMethod::Other => "Other",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "BankTransfer" => Ok(PayoutMethod::BankTransfer),
            "Cash" => Ok(PayoutMethod::Cash),
            "Check" => Ok(PayoutMethod::Check),
            "Stripe" => Ok(PayoutMethod::Stripe),
            "Other" => Ok(PayoutMethod::Other),
            _ => Err(AppError::Validation(format!("Unknown payout method: {}", s))),
        }
    }
}

/// Insert payload for a freshly created gateway intent.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub booking_id: i64,
    pub total_cents: i64,
    pub commission_cents: i64,
    pub workshop_cents: i64,
    pub commission_rate: f64,
    pub stripe_payment_intent_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkPaidOutRequest {
    pub payout_method: String,
    pub payout_reference: Option<String>,
    pub payout_notes: Option<String>,
}

/// What `create_payment_intent` hands back to the HTTP layer. The client
/// secret goes to the caller for the client-side confirmation flow and is
/// never written to logs.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentCreated {
    pub payment: Payment,
    pub client_secret: String,
}
