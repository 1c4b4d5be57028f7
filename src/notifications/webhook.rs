use async_trait::async_trait;
use std::time::Duration;

use crate::{
    error::{AppError, Result},
    notifications::{Notification, NotificationSink},
};

/// Posts every notification as JSON to a configured endpoint, e.g. the
/// real-time push service that fans messages out to the mobile apps.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: Option<String>) -> Option<Self> {
        let url = url?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .ok()?;
        Some(Self { client, url })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Notification webhook error: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Gateway(format!(
                "Notification webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
