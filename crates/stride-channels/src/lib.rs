//! # Stride Channels
//! External delivery channels: webhook, Discord and email.

pub mod discord;
pub mod email;
pub mod webhook;

use std::sync::Arc;
use stride_core::config::ChannelsConfig;
use stride_core::traits::DeliveryChannel;

pub use discord::DiscordChannel;
pub use email::EmailChannel;
pub use webhook::WebhookChannel;

/// Build every channel that has enough configuration to attempt delivery.
///
/// Channels are registered whether or not they are enabled; enablement is
/// checked per dispatch so it can be toggled without a restart.
pub fn build_channels(config: &ChannelsConfig) -> Vec<Arc<dyn DeliveryChannel>> {
    let mut channels: Vec<Arc<dyn DeliveryChannel>> = Vec::new();

    if config.webhook.url.is_some() {
        channels.push(Arc::new(WebhookChannel::new(config.webhook.clone())));
    }
    if config.discord.webhook_url.is_some() {
        channels.push(Arc::new(DiscordChannel::new(config.discord.clone())));
    }
    if !config.email.smtp_host.is_empty() {
        match EmailChannel::new(config.email.clone()) {
            Ok(channel) => channels.push(Arc::new(channel)),
            Err(e) => tracing::warn!("⚠️ Email channel unavailable: {e}"),
        }
    }

    tracing::info!(
        "📡 {} delivery channel(s) available: {}",
        channels.len(),
        channels.iter().map(|c| c.id()).collect::<Vec<_>>().join(", ")
    );
    channels
}
