use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::platform::app_error::{AppError, AppResult};

/// Outbound e-mail capability. Callers treat failures as non-fatal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, address: &str, subject: &str, context: Value) -> AppResult<()>;
}

#[derive(Serialize)]
struct NotificationRequest<'a> {
    address: &'a str,
    subject: &'a str,
    context: Value,
}

pub struct HttpNotifier {
    client: Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, address: &str, subject: &str, context: Value) -> AppResult<()> {
        self.client
            .post(format!("{}/notifications", self.base_url))
            .json(&NotificationRequest {
                address,
                subject,
                context,
            })
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|_| AppError::UpstreamError("NotificationService".into()))?;

        Ok(())
    }
}

/// Sends a notification and logs instead of failing the caller.
pub async fn notify_best_effort(notifier: &dyn Notifier, address: &str, subject: &str, context: Value) {
    if let Err(err) = notifier.notify(address, subject, context).await {
        tracing::warn!("Failed to send \"{}\" notification to {}: {}", subject, address, err);
    }
}
