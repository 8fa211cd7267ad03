use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Out-of-band delivery to a user. Implementations must not log `body`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Development notifier: records that a message went out, nothing more.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            recipient = %notification.recipient,
            subject = %notification.subject,
            "notification dispatched (log only)"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Hands mail to an HTTP relay as JSON.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
    from: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = WebhookPayload {
            from: &self.from,
            to: &notification.recipient,
            subject: &notification.subject,
            text: &notification.body,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("mail webhook request")?;
        if !response.status().is_success() {
            return Err(anyhow!("mail webhook returned status {}", response.status()));
        }
        info!(recipient = %notification.recipient, "notification delivered");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> std::sync::Arc<dyn Notifier> {
    match &cfg.webhook_url {
        Some(url) => std::sync::Arc::new(WebhookNotifier::new(url, &cfg.from)),
        None => std::sync::Arc::new(LogNotifier),
    }
}
