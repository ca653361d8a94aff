//! Run-status notifications.
//!
//! Each configured channel decides on its own whether a run outcome is
//! worth sending (`on_success` / `on_failure`). Delivery failures are
//! logged and never replace the run's own result.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::NotificationsConfig;

const DEFAULT_FAILURE_TITLE: &str = "Bookstack File Exporter Failed";
const DEFAULT_SUCCESS_TITLE: &str = "Bookstack File Exporter Succeeded";

/// Trait for a notification transport
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name for logs
    fn name(&self) -> &str;

    /// Deliver one message
    async fn send(&self, title: &str, body: &str) -> Result<()>;
}

/// POSTs `{"title": ..., "body": ...}` to a URL
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, title: &str, body: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&serde_json::json!({
                "title": title,
                "body": body,
            }))
            .send()
            .await
            .context("Failed to send webhook notification")?
            .error_for_status()
            .context("Webhook endpoint rejected notification")?;
        Ok(())
    }
}

/// Telegram Bot API sender
pub struct TelegramNotifier {
    /// Bot token
    bot_token: String,
    /// Target chat ID
    chat_id: String,
    /// HTTP client
    client: reqwest::Client,
}

/// Response from Telegram API
#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String, client: reqwest::Client) -> Self {
        Self {
            bot_token,
            chat_id,
            client,
        }
    }

    /// Build API URL
    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, title: &str, body: &str) -> Result<()> {
        let url = self.api_url("sendMessage");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": format!("{}\n\n{}", title, body),
            }))
            .send()
            .await
            .context("Failed to send Telegram message")?;

        let result: TelegramResponse = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !result.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                result.description.unwrap_or_default()
            );
        }
        Ok(())
    }
}

/// A notifier plus the outcomes it reports
pub struct NotifyChannel {
    pub notifier: Box<dyn Notifier>,
    pub on_success: bool,
    pub on_failure: bool,
    pub custom_title: Option<String>,
}

impl NotifyChannel {
    /// Whether this channel reports the given outcome
    pub fn should_send(&self, failed: bool) -> bool {
        (failed && self.on_failure) || (!failed && self.on_success)
    }

    fn title(&self, failed: bool) -> &str {
        match &self.custom_title {
            Some(title) => title.as_str(),
            None if failed => DEFAULT_FAILURE_TITLE,
            None => DEFAULT_SUCCESS_TITLE,
        }
    }
}

/// Fans a run outcome out to all configured channels
#[derive(Default)]
pub struct NotifyHandler {
    channels: Vec<NotifyChannel>,
}

impl NotifyHandler {
    pub fn new(channels: Vec<NotifyChannel>) -> Self {
        Self { channels }
    }

    /// Build channels from the `notifications` block
    pub fn from_config(config: &NotificationsConfig, client: reqwest::Client) -> Self {
        let mut channels = Vec::new();

        if let Some(webhook) = &config.webhook {
            channels.push(NotifyChannel {
                notifier: Box::new(WebhookNotifier::new(webhook.url.clone(), client.clone())),
                on_success: webhook.on_success,
                on_failure: webhook.on_failure,
                custom_title: webhook.custom_title.clone(),
            });
        }

        if let Some(telegram) = &config.telegram {
            channels.push(NotifyChannel {
                notifier: Box::new(TelegramNotifier::new(
                    telegram.bot_token.clone(),
                    telegram.chat_id.clone(),
                    client,
                )),
                on_success: telegram.on_success,
                on_failure: telegram.on_failure,
                custom_title: telegram.custom_title.clone(),
            });
        }

        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send the run outcome to every channel that wants it.
    ///
    /// Returns the number of channels that delivered successfully.
    pub async fn do_notify(&self, run_error: Option<&anyhow::Error>) -> usize {
        if self.channels.is_empty() {
            debug!("No notification targets found");
            return 0;
        }

        let failed = run_error.is_some();
        let body = message_body(run_error);
        let mut delivered = 0;

        for channel in &self.channels {
            if !channel.should_send(failed) {
                continue;
            }
            let name = channel.notifier.name();
            info!(channel = name, "Sending notification for run status");
            match channel.notifier.send(channel.title(failed), &body).await {
                Ok(()) => delivered += 1,
                Err(e) => error!(channel = name, error = %e, "Failed to send notification"),
            }
        }

        delivered
    }
}

/// Message body for a run outcome
pub fn message_body(run_error: Option<&anyhow::Error>) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    match run_error {
        Some(err) => format!(
            "Bookstack File Exporter encountered an unrecoverable error.\n\n\
             Occurred At: {}\n\n\
             Error message: {:#}",
            timestamp, err
        ),
        None => format!(
            "Bookstack File Exporter completed successfully.\n\n\
             Completed At: {}",
            timestamp
        ),
    }
}
