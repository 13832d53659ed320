//! Outcome notifications
//!
//! Fire-and-forget: a slow or failing notifier never delays an evaluation.

use crate::config::NotifyConfig;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Terminal outcome kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Executed,
    Rejected,
    Failed,
    /// Trade went out but the outcome could not be recorded
    LeaseLost,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::Executed => "executed",
            NotificationKind::Rejected => "rejected",
            NotificationKind::Failed => "failed",
            NotificationKind::LeaseLost => "lease_lost",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub asset_id: String,
    pub kind: NotificationKind,
    /// Human-readable reason
    pub reason: String,
    pub order_ref: Option<String>,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(asset_id: impl Into<String>, kind: NotificationKind, reason: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            kind,
            reason: reason.into(),
            order_ref: None,
            at: Utc::now(),
        }
    }

    pub fn with_order_ref(mut self, order_ref: impl Into<String>) -> Self {
        self.order_ref = Some(order_ref.into());
        self
    }
}

pub trait Notifier: Send + Sync {
    /// Must not block
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.kind {
            NotificationKind::Executed | NotificationKind::Rejected => tracing::info!(
                target: "notify",
                asset_id = %n.asset_id,
                kind = %n.kind,
                reason = %n.reason,
                order_ref = ?n.order_ref,
                "Evaluation finished"
            ),
            NotificationKind::Failed | NotificationKind::LeaseLost => tracing::warn!(
                target: "notify",
                asset_id = %n.asset_id,
                kind = %n.kind,
                reason = %n.reason,
                order_ref = ?n.order_ref,
                "Evaluation finished"
            ),
        }
    }
}

/// POSTs each notification as JSON to the chat front-end webhook
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            let result = client
                .post(&url)
                .json(&notification)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::warn!(
                    target: "notify",
                    asset_id = %notification.asset_id,
                    error = %e,
                    "Webhook delivery failed"
                );
            }
        });
    }
}

/// Forwards notifications into a channel; drops them when the channel is full
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            tracing::debug!(target: "notify", error = %e, "Notification dropped");
        }
    }
}

/// Build the configured notifier
pub fn build_notifier(config: &NotifyConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url.clone())?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}
