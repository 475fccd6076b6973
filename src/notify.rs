//! Notification sender abstraction.
//!
//! This module defines the `Notifier` trait to abstract delivering workflow notifications
//! (a request awaits review, a request was approved, ...), enabling testability with mock
//! implementations.
//!
//! `Notifier` is a capability set: each channel has its own method, and a channel an
//! implementation does not provide fails with `ImplementationNotFound` instead of being
//! dropped. Callers can check [`Notifier::supports`] first.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::approval::{ApprovalRequestId, ApprovalRequestStatus};
use crate::error::{CountersignError, Result};

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
    Webhook,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Email, Channel::Sms, Channel::Push, Channel::Webhook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
            Channel::Webhook => "webhook",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message about an approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: Channel,
    /// Usernames, addresses or device tokens, depending on the channel
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub approval_id: Option<ApprovalRequestId>,
    pub status: Option<ApprovalRequestStatus>,
}

fn unsupported(channel: Channel) -> CountersignError {
    CountersignError::ImplementationNotFound(format!("{channel} notifications"))
}

/// Trait for delivering notifications.
///
/// # Example
/// ```ignore
/// let notifier = WebhookNotifier::new("https://hooks.example.com/approvals");
/// if notifier.supports(Channel::Webhook) {
///     notifier.send(&notification).await?;
/// }
/// ```
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channels this implementation can deliver on.
    fn channels(&self) -> &[Channel];

    fn supports(&self, channel: Channel) -> bool {
        self.channels().contains(&channel)
    }

    /// Route the notification to the method for its channel.
    async fn send(&self, notification: &Notification) -> Result<()> {
        match notification.channel {
            Channel::Email => self.send_email(notification).await,
            Channel::Sms => self.send_sms(notification).await,
            Channel::Push => self.send_push(notification).await,
            Channel::Webhook => self.send_webhook(notification).await,
        }
    }

    async fn send_email(&self, _notification: &Notification) -> Result<()> {
        Err(unsupported(Channel::Email))
    }

    async fn send_sms(&self, _notification: &Notification) -> Result<()> {
        Err(unsupported(Channel::Sms))
    }

    async fn send_push(&self, _notification: &Notification) -> Result<()> {
        Err(unsupported(Channel::Push))
    }

    async fn send_webhook(&self, _notification: &Notification) -> Result<()> {
        Err(unsupported(Channel::Webhook))
    }
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Posts every notification as JSON to a fixed URL.
///
/// Email, SMS and push delivery live behind the receiving service; this notifier
/// only speaks the webhook channel.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    bearer_token: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            bearer_token: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channels(&self) -> &[Channel] {
        &[Channel::Webhook]
    }

    #[tracing::instrument(skip(self, notification), fields(url = %self.url, approval_id = ?notification.approval_id))]
    async fn send_webhook(&self, notification: &Notification) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(notification);

        // Only add Authorization header if a token is configured
        if let Some(token) = &self.bearer_token {
            req = req.header("Authorization", format!("Bearer {}", token));
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(error = %e, "Webhook notification failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CountersignError::Other(anyhow::anyhow!(
                "Webhook returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        tracing::debug!(status = status.as_u16(), "Webhook notification delivered");
        Ok(())
    }
}

/// Accepts every channel and delivers nothing.
///
/// For deployments that have no notification service wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    fn channels(&self) -> &[Channel] {
        &Channel::ALL
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::trace!(
            channel = %notification.channel,
            recipients = notification.recipients.len(),
            subject = %notification.subject,
            "Dropping notification"
        );
        Ok(())
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Mock notifier for testing.
///
/// Records every notification it is asked to send. Channels outside the configured
/// set fail with `ImplementationNotFound`; individual channels can be made to fail.
///
/// # Example
/// ```ignore
/// let mock = MockNotifier::new();
/// mock.fail_channel(Channel::Email);
/// // ... run the workflow ...
/// assert_eq!(mock.sent().len(), 1);
/// ```
#[derive(Clone)]
pub struct MockNotifier {
    channels: Vec<Channel>,
    sent: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<Mutex<HashSet<Channel>>>,
}

impl MockNotifier {
    /// Create a mock that supports every channel.
    pub fn new() -> Self {
        Self::with_channels(Channel::ALL.to_vec())
    }

    pub fn with_channels(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            sent: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make every later send on `channel` fail.
    pub fn fail_channel(&self, channel: Channel) {
        self.failing.lock().insert(channel);
    }

    /// Get all notifications that were delivered.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    fn record(&self, notification: &Notification) -> Result<()> {
        if !self.supports(notification.channel) {
            return Err(unsupported(notification.channel));
        }
        if self.failing.lock().contains(&notification.channel) {
            return Err(CountersignError::Other(anyhow::anyhow!(
                "Mock {} delivery failure",
                notification.channel
            )));
        }
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    fn channels(&self) -> &[Channel] {
        &self.channels
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.record(notification)
    }
}
