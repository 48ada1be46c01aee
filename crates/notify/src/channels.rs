use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use crate::{NotificationChannel, NotificationRequest, NotifyError};

/// Posts a plain-text summary to a Slack incoming webhook.
pub struct SlackWebhookChannel {
    client: reqwest::Client,
    webhook_url: SecretString,
}

impl SlackWebhookChannel {
    pub fn new(webhook_url: SecretString) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self { client, webhook_url })
    }

    fn render_text(request: &NotificationRequest) -> String {
        let reminder_suffix = if request.reminder_count > 0 {
            format!(" (reminder #{})", request.reminder_count + 1)
        } else {
            String::new()
        };
        let link = request
            .url
            .as_deref()
            .map(|url| format!("\n{url}"))
            .unwrap_or_default();
        format!(
            "<@{}> {}: {}{reminder_suffix}{link}",
            request.user_id.0, request.notification_type, request.title
        )
    }
}

#[async_trait]
impl NotificationChannel for SlackWebhookChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let body = serde_json::json!({ "text": Self::render_text(request) });

        let response = self
            .client
            .post(self.webhook_url.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Store backing the in-app channel. The product's notification inbox owns
/// the real implementation; the engine only needs a write path.
#[async_trait]
pub trait InAppStore: Send + Sync {
    async fn record(&self, request: &NotificationRequest) -> Result<(), NotifyError>;
}

#[derive(Default)]
pub struct InMemoryInAppStore {
    records: RwLock<Vec<NotificationRequest>>,
}

impl InMemoryInAppStore {
    pub async fn records(&self) -> Vec<NotificationRequest> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl InAppStore for InMemoryInAppStore {
    async fn record(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        self.records.write().await.push(request.clone());
        Ok(())
    }
}

pub struct InAppChannel {
    store: Arc<dyn InAppStore>,
}

impl InAppChannel {
    pub fn new(store: Arc<dyn InAppStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationChannel for InAppChannel {
    fn name(&self) -> &str {
        "in_app"
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        self.store.record(request).await
    }
}

/// Test double: records every request and optionally fails each delivery.
pub struct RecordingChannel {
    name: String,
    failure: Option<String>,
    delivered: RwLock<Vec<NotificationRequest>>,
}

impl RecordingChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), failure: None, delivered: RwLock::new(Vec::new()) }
    }

    pub fn failing(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self { name: name.into(), failure: Some(error.into()), delivered: RwLock::new(Vec::new()) }
    }

    pub async fn delivered(&self) -> Vec<NotificationRequest> {
        self.delivered.read().await.clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        if let Some(error) = &self.failure {
            return Err(NotifyError::Transport(error.clone()));
        }

        self.delivered.write().await.push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tiller_core::domain::directory::{OrgId, UserId};

    use super::{InAppChannel, InMemoryInAppStore, SlackWebhookChannel};
    use crate::{NotificationChannel, NotificationRequest};

    fn request(reminder_count: u32) -> NotificationRequest {
        NotificationRequest {
            user_id: UserId("alice".to_string()),
            org_id: OrgId("org-1".to_string()),
            notification_type: "nudge".to_string(),
            title: "Refund flow edge cases".to_string(),
            item_id: "T-3".to_string(),
            url: Some("https://app.example.com/tasks/T-3".to_string()),
            reminder_count,
        }
    }

    #[test]
    fn slack_text_names_the_user_and_counts_reminders() {
        let text = SlackWebhookChannel::render_text(&request(1));

        assert!(text.contains("<@alice>"));
        assert!(text.contains("(reminder #2)"));
        assert!(text.contains("https://app.example.com/tasks/T-3"));

        let first = SlackWebhookChannel::render_text(&request(0));
        assert!(!first.contains("reminder #"));
    }

    #[tokio::test]
    async fn in_app_channel_writes_through_the_store() {
        let store = Arc::new(InMemoryInAppStore::default());
        let channel = InAppChannel::new(store.clone());

        channel.deliver(&request(0)).await.expect("deliver");

        let records = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].item_id, "T-3");
    }
}
