//! Webhook channel: POST notifications as JSON to an external endpoint.
//!
//! Useful for integrating with external systems (Zapier, n8n, custom APIs).
//! When a secret is configured the body is signed with HMAC-SHA256 and the
//! signature sent as `X-Stride-Signature: sha256=<hex>`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use stride_core::config::WebhookConfig;
use stride_core::error::{Result, StrideError};
use stride_core::traits::DeliveryChannel;
use stride_core::types::Notification;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Stride-Signature";

/// Webhook channel.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// JSON body sent for a notification.
    pub fn render_body(notification: &Notification) -> serde_json::Value {
        serde_json::json!({
            "id": notification.id,
            "kind": notification.kind.to_string(),
            "title": notification.title,
            "message": notification.message,
            "priority": notification.priority,
            "created_at": notification.created_at,
            "payload": notification.payload,
        })
    }
}

/// `sha256=<hex>` signature of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| StrideError::channel(format!("Invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a signature produced by [`sign`], in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_sig) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[async_trait]
impl DeliveryChannel for WebhookChannel {
    fn id(&self) -> &str { "webhook" }

    async fn attempt(&self, notification: &Notification) -> Result<bool> {
        let Some(url) = &self.config.url else {
            return Err(StrideError::ChannelNotConfigured("webhook url".into()));
        };
        let body = serde_json::to_vec(&Self::render_body(notification))?;

        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(secret) = &self.config.secret {
            request = request.header(SIGNATURE_HEADER, sign(secret, &body)?);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| StrideError::Http(format!("Webhook send failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StrideError::Http(format!("Webhook {status}: {text}")));
        }
        tracing::debug!("Webhook delivered {}", notification.id);
        Ok(true)
    }
}
