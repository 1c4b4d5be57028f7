use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub mod stripe_gateway;

pub use stripe_gateway::{parse_webhook_event, StripeGateway, WebhookOutcome};

/// What the gateway hands back for a freshly created intent. The client
/// secret is for the caller's client-side confirmation flow; it must never
/// be logged.
#[derive(Debug, Clone)]
pub struct IntentHandle {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund_id: String,
    pub status: String,
}

/// Thin seam over the third-party charge/refund API. Implementations carry
/// their own timeout and surface failures as the retryable
/// `AppError::Gateway` class.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<IntentHandle>;

    /// Full refund when `amount_cents` is None, partial otherwise.
    async fn refund(&self, intent_id: &str, amount_cents: Option<i64>) -> Result<RefundOutcome>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeGateway;

#[cfg(any(test, feature = "test-utils"))]
mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{IntentHandle, PaymentGateway, RefundOutcome};
    use crate::error::{AppError, Result};

    /// Deterministic in-memory gateway for tests: hands out sequential
    /// intent ids and records every refund it is asked for.
    #[derive(Default)]
    pub struct FakeGateway {
        next_intent: AtomicU64,
        pub refunds: Mutex<Vec<(String, Option<i64>)>>,
        fail_refunds: AtomicBool,
    }

    impl FakeGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_refunds(&self, fail: bool) {
            self.fail_refunds.store(fail, Ordering::SeqCst);
        }

        pub fn refund_count(&self) -> usize {
            self.refunds.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_intent(
            &self,
            _amount_cents: i64,
            _currency: &str,
            _metadata: HashMap<String, String>,
        ) -> Result<IntentHandle> {
            let n = self.next_intent.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(IntentHandle {
                intent_id: format!("pi_test_{}", n),
                client_secret: format!("pi_test_{}_secret", n),
            })
        }

        async fn refund(
            &self,
            intent_id: &str,
            amount_cents: Option<i64>,
        ) -> Result<RefundOutcome> {
            if self.fail_refunds.load(Ordering::SeqCst) {
                return Err(AppError::Gateway("refund rejected by test gateway".to_string()));
            }
            self.refunds
                .lock()
                .unwrap()
                .push((intent_id.to_string(), amount_cents));
            Ok(RefundOutcome {
                refund_id: format!("re_test_{}", intent_id),
                status: "succeeded".to_string(),
            })
        }
    }
}
