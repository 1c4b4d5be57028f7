use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;

pub mod webhook;

pub use webhook::WebhookSink;

/// An asynchronous side-channel message about a lifecycle or settlement
/// event. Delivery is fire-and-forget: a failed sink never rolls back the
/// state transition that produced the notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub sender_user_id: i64,
    pub receiver_user_id: i64,
    pub message: String,
    pub kind: NotificationKind,
    pub booking_id: Option<i64>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum NotificationKind {
    BookingCreated,
    BookingStatusChanged,
    PaymentSettled,
    PayoutSent,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

pub struct NotificationDispatcher {
    sinks: RwLock<Vec<Arc<dyn NotificationSink>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, sink: Arc<dyn NotificationSink>) {
        if sink.is_enabled() {
            let name = sink.name().to_string();
            self.sinks.write().await.push(sink);
            tracing::info!("Registered notification sink: {}", name);
        }
    }

    /// Delivers to every enabled sink, logging failures and moving on.
    pub async fn notify(&self, notification: Notification) {
        let sinks = self.sinks.read().await;

        for sink in sinks.iter() {
            if !sink.is_enabled() {
                continue;
            }

            match sink.deliver(&notification).await {
                Ok(_) => {
                    tracing::debug!("Sink {} delivered notification", sink.name());
                }
                Err(e) => {
                    tracing::error!(
                        "Sink {} failed to deliver notification: {:?}",
                        sink.name(),
                        e
                    );
                    // Keep going; other sinks still get the message.
                }
            }
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Sink that just writes the notification to the structured log. Useful in
/// development and as a delivery audit trail in production.
pub struct LogSink {
    enabled: bool,
}

impl LogSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            receiver = notification.receiver_user_id,
            booking = ?notification.booking_id,
            kind = ?notification.kind,
            "{}",
            notification.message
        );
        Ok(())
    }
}
