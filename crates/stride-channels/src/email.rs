//! Email channel: SMTP delivery over STARTTLS via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use stride_core::config::EmailConfig;
use stride_core::error::{Result, StrideError};
use stride_core::traits::DeliveryChannel;
use stride_core::types::Notification;

pub struct EmailChannel {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Result<Self> {
        if config.smtp_host.is_empty() {
            return Err(StrideError::ChannelNotConfigured("email smtp_host".into()));
        }
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| StrideError::channel(format!("SMTP relay configuration error: {e}")))?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            config,
        })
    }
}

/// Plain-text email for a notification.
pub fn build_message(config: &EmailConfig, notification: &Notification) -> Result<Message> {
    let from: Mailbox = config
        .from
        .parse()
        .map_err(|e| StrideError::config(format!("Invalid email.from '{}': {e}", config.from)))?;
    let to: Mailbox = config
        .to
        .parse()
        .map_err(|e| StrideError::config(format!("Invalid email.to '{}': {e}", config.to)))?;

    let body = format!(
        "{}\n\n{}\n\nPriority: {}\nSent: {}\n",
        notification.title,
        notification.message,
        notification.priority,
        notification.created_at.format("%Y-%m-%d %H:%M UTC"),
    );

    Message::builder()
        .from(from)
        .to(to)
        .subject(format!("[Stride] {}", notification.title))
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|e| StrideError::channel(format!("Build email: {e}")))
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn id(&self) -> &str { "email" }

    async fn attempt(&self, notification: &Notification) -> Result<bool> {
        let message = build_message(&self.config, notification)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| StrideError::channel(format!("SMTP send failed: {e}")))?;
        tracing::debug!("SMTP accepted {}: {:?}", notification.id, response.code());
        Ok(response.is_positive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_core::types::NotificationKind;

    fn config() -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".into(),
            from: "Stride <stride@example.com>".into(),
            to: "alex@example.com".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_message() {
        let n = Notification::new(NotificationKind::Goal, "Goal reached", "10k steps today");
        let message = build_message(&config(), &n).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: [Stride] Goal reached"));
        assert!(raw.contains("To: alex@example.com"));
        assert!(raw.contains("10k steps today"));
    }

    #[test]
    fn test_invalid_address() {
        let mut bad = config();
        bad.to = "not an address".into();
        let n = Notification::new(NotificationKind::System, "t", "m");
        assert!(matches!(build_message(&bad, &n).unwrap_err(), StrideError::Config(_)));
    }

    #[test]
    fn test_requires_host() {
        assert!(matches!(
            EmailChannel::new(EmailConfig::default()).err(),
            Some(StrideError::ChannelNotConfigured(_))
        ));
    }
}
