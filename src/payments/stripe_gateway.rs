use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use stripe::{
    Client, CreatePaymentIntent, CreateRefund, Currency, EventObject, EventType, PaymentIntent,
    PaymentIntentId, Refund, Webhook, WebhookError,
};

use crate::{
    error::{AppError, Result},
    payments::{IntentHandle, PaymentGateway, RefundOutcome},
};

/// How long we wait on the provider before surfacing a retryable gateway
/// error instead of hanging a request task.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);

pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(api_key),
        }
    }

    fn currency(code: &str) -> Result<Currency> {
        code.parse::<Currency>()
            .map_err(|_| AppError::Validation(format!("Unknown currency: {}", code)))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<IntentHandle> {
        let mut params = CreatePaymentIntent::new(amount_cents, Self::currency(currency)?);
        params.metadata = Some(metadata);

        let intent = tokio::time::timeout(
            GATEWAY_TIMEOUT,
            PaymentIntent::create(&self.client, params),
        )
        .await
        .map_err(|_| AppError::Gateway("Payment provider timed out".to_string()))?
        .map_err(|e| AppError::Gateway(format!("Stripe error: {}", e)))?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| AppError::Gateway("No client secret returned".to_string()))?;

        Ok(IntentHandle {
            intent_id: intent.id.to_string(),
            client_secret,
        })
    }

    async fn refund(&self, intent_id: &str, amount_cents: Option<i64>) -> Result<RefundOutcome> {
        let intent_id = intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| AppError::Validation(format!("Invalid payment intent id: {}", e)))?;

        let mut params = CreateRefund::new();
        params.payment_intent = Some(intent_id);
        params.amount = amount_cents;

        let refund = tokio::time::timeout(GATEWAY_TIMEOUT, Refund::create(&self.client, params))
            .await
            .map_err(|_| AppError::Gateway("Payment provider timed out".to_string()))?
            .map_err(|e| AppError::Gateway(format!("Stripe error: {}", e)))?;

        Ok(RefundOutcome {
            refund_id: refund.id.to_string(),
            status: refund
                .status
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

/// What a verified webhook payload asks the settlement engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    PaymentSucceeded { intent_id: String },
    PaymentFailed { intent_id: String },
    Ignored,
}

/// Verifies the provider signature and maps the event to a settlement
/// command. Bad signatures are a validation failure, not a gateway one:
/// they are never worth retrying.
pub fn parse_webhook_event(
    payload: &str,
    stripe_signature: &str,
    webhook_secret: &str,
) -> Result<WebhookOutcome> {
    let event = Webhook::construct_event(payload, stripe_signature, webhook_secret).map_err(
        |e| match e {
            WebhookError::BadSignature => AppError::Validation("Invalid signature".to_string()),
            _ => AppError::Gateway(format!("Webhook error: {}", e)),
        },
    )?;

    let outcome = match event.type_ {
        EventType::PaymentIntentSucceeded => {
            if let EventObject::PaymentIntent(intent) = event.data.object {
                WebhookOutcome::PaymentSucceeded {
                    intent_id: intent.id.to_string(),
                }
            } else {
                WebhookOutcome::Ignored
            }
        }
        EventType::PaymentIntentPaymentFailed => {
            if let EventObject::PaymentIntent(intent) = event.data.object {
                WebhookOutcome::PaymentFailed {
                    intent_id: intent.id.to_string(),
                }
            } else {
                WebhookOutcome::Ignored
            }
        }
        _ => {
            tracing::debug!("Unhandled webhook event type: {:?}", event.type_);
            WebhookOutcome::Ignored
        }
    };

    Ok(outcome)
}
