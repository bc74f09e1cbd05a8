//! Discord channel: posts to a channel through an incoming webhook.

use async_trait::async_trait;
use stride_core::config::DiscordConfig;
use stride_core::error::{Result, StrideError};
use stride_core::traits::DeliveryChannel;
use stride_core::types::{Notification, Priority};

/// Discord rejects message content longer than this many characters.
const MAX_CONTENT_CHARS: usize = 2000;

/// Discord webhook channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("Stride/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Markdown message content for a notification, truncated to Discord's limit.
    pub fn format_content(notification: &Notification) -> String {
        let badge = match notification.priority {
            Priority::Urgent => "🚨 ",
            Priority::High => "❗ ",
            Priority::Medium | Priority::Low => "",
        };
        let content = if notification.message.is_empty() {
            format!("{badge}**{}**", notification.title)
        } else {
            format!("{badge}**{}**\n{}", notification.title, notification.message)
        };
        truncate_chars(&content, MAX_CONTENT_CHARS)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('…');
    out
}

#[async_trait]
impl DeliveryChannel for DiscordChannel {
    fn id(&self) -> &str { "discord" }

    async fn attempt(&self, notification: &Notification) -> Result<bool> {
        let Some(url) = &self.config.webhook_url else {
            return Err(StrideError::ChannelNotConfigured("discord webhook_url".into()));
        };
        let mut body = serde_json::json!({ "content": Self::format_content(notification) });
        if let Some(username) = &self.config.username {
            body["username"] = serde_json::Value::String(username.clone());
        }

        let response = self.client.post(url).json(&body).send().await
            .map_err(|e| StrideError::Http(format!("Discord send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StrideError::Http(format!("Discord {status}: {text}")));
        }
        Ok(true)
    }
}
