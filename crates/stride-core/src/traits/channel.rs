//! Delivery channel trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Notification;

/// An independent delivery collaborator (webhook, Discord, email, push...).
///
/// The engine only ever calls [`attempt`](DeliveryChannel::attempt).
/// Transport details and any retry policy belong to the implementation.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Stable channel id, matched against `Notification::channel_targets`.
    fn id(&self) -> &str;

    /// Try to deliver once. `Ok(false)` and `Err(_)` both count as failure.
    async fn attempt(&self, notification: &Notification) -> Result<bool>;
}
