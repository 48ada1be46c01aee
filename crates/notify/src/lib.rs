//! Outbound notification boundary.
//!
//! Delivery is a constructor-injected capability: agents receive a
//! [`Notifier`] holding whatever [`NotificationChannel`] implementations the
//! operator configured, and fan a single [`NotificationRequest`] out across
//! all of them. The fan-out itself never fails; callers read the per-channel
//! [`ChannelReceipt`]s and decide what partial delivery means for them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tiller_core::domain::directory::{OrgId, UserId};

pub mod channels;

pub use channels::{InAppChannel, InAppStore, InMemoryInAppStore, RecordingChannel, SlackWebhookChannel};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub user_id: UserId,
    pub org_id: OrgId,
    /// Notification category, e.g. `nudge` or `task_reassigned`.
    pub notification_type: String,
    pub title: String,
    /// Id of the task / pull request the notification concerns.
    pub item_id: String,
    pub url: Option<String>,
    pub reminder_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReceipt {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("channel rejected the message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, request: &NotificationRequest) -> Result<(), NotifyError>;
}

/// Fan-out over the configured channels.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Notifier {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|channel| channel.name()).collect()
    }

    pub async fn dispatch(&self, request: &NotificationRequest) -> Vec<ChannelReceipt> {
        let mut receipts = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let receipt = match channel.deliver(request).await {
                Ok(()) => ChannelReceipt {
                    channel: channel.name().to_string(),
                    success: true,
                    error: None,
                },
                Err(error) => {
                    tracing::warn!(
                        channel = channel.name(),
                        item_id = %request.item_id,
                        %error,
                        "notification channel failed"
                    );
                    ChannelReceipt {
                        channel: channel.name().to_string(),
                        success: false,
                        error: Some(error.to_string()),
                    }
                }
            };
            receipts.push(receipt);
        }

        receipts
    }
}

/// True when at least one channel accepted the message.
pub fn delivered_to_any(receipts: &[ChannelReceipt]) -> bool {
    receipts.iter().any(|receipt| receipt.success)
}

/// Names of channels that rejected the message.
pub fn failed_channels(receipts: &[ChannelReceipt]) -> Vec<&str> {
    receipts
        .iter()
        .filter(|receipt| !receipt.success)
        .map(|receipt| receipt.channel.as_str())
        .collect()
}
