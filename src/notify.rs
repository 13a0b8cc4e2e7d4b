//! Registration event notification.
//!
//! Fire-and-forget webhook posts on successful registration. Failures here
//! are logged and swallowed; they never roll back or fail the registration
//! that triggered them.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

/// Event emitted after a successful registration.
#[derive(Debug, Clone)]
pub struct RegistrationEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub username: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &RegistrationEvent);
}

/// Posts the event as JSON to each configured webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhooks: Vec<String>,
}

impl WebhookNotifier {
    pub fn new(webhooks: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhooks,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &RegistrationEvent) {
        // Keep the payload small; long descriptions get clipped.
        let description: String = event.description.chars().take(120).collect();
        let body = json!({
            "_id": event.id,
            "name": event.title,
            "description": description,
            "username": event.username,
        });

        for url in &self.webhooks {
            if let Err(e) = self.client.post(url).json(&body).send().await {
                warn!(webhook = %url, error = %e, "registration notification failed");
            }
        }
    }
}

/// No-op notifier for contexts without webhooks configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _event: &RegistrationEvent) {}
}
