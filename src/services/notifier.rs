//! Email notification collaborator
//!
//! Template rendering and delivery live in the mail service; the engine only
//! hands it a recipient, a template name and the data to render. Failures are
//! reported to the caller, which logs them: store state is already committed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::ProviderError;
use crate::models::notification::Notification;

const PROVIDER: &str = "mail service";

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), ProviderError>;
}

/// Posts notifications as JSON to the mail service
#[derive(Clone)]
pub struct HttpNotifier {
    client: Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&notification)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(
            recipient = %notification.recipient,
            template = %notification.template,
            "Notification sent"
        );
        Ok(())
    }
}

/// Used when no mail service is configured
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), ProviderError> {
        tracing::info!(
            recipient = %notification.recipient,
            template = %notification.template,
            data = %notification.data,
            "Mail service not configured, notification logged only"
        );
        Ok(())
    }
}

/// Send and log the outcome; never fails the caller
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    let recipient = notification.recipient.clone();
    let template = notification.template;

    if let Err(e) = notifier.notify(notification).await {
        tracing::warn!(
            recipient = %recipient,
            template = %template,
            error = %e,
            "Failed to send notification"
        );
    }
}
