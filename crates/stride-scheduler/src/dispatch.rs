//! Concurrent fan-out of one notification to external delivery channels.

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use stride_core::error::{Result, StrideError};
use stride_core::traits::DeliveryChannel;
use stride_core::types::Notification;

/// Per-channel outcome of one dispatch. `true` means delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DispatchResult(BTreeMap<String, bool>);

impl DispatchResult {
    pub fn get(&self, channel_id: &str) -> Option<bool> {
        self.0.get(channel_id).copied()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, ok)| **ok).map(|(id, _)| id.as_str())
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter(|(_, ok)| !**ok).map(|(id, _)| id.as_str())
    }

    /// `true` when every attempted channel delivered. Vacuously true when
    /// nothing was attempted.
    pub fn all_succeeded(&self) -> bool {
        self.0.values().all(|ok| *ok)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, bool> {
        &self.0
    }
}

impl FromIterator<(String, bool)> for DispatchResult {
    fn from_iter<T: IntoIterator<Item = (String, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Runs every channel's `attempt` concurrently. A channel that errors,
/// panics or times out is recorded as `false` without affecting the others.
#[derive(Debug, Clone, Default)]
pub struct ChannelDispatcher {
    attempt_timeout: Option<Duration>,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each attempt. Without this a hung channel holds up the result.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub async fn dispatch(
        &self,
        notification: &Notification,
        channels: &[Arc<dyn DeliveryChannel>],
    ) -> DispatchResult {
        let attempts = channels.iter().map(|channel| async move {
            let id = channel.id().to_string();
            let ok = match self.attempt_one(channel.as_ref(), notification).await {
                Ok(delivered) => delivered,
                Err(e) => {
                    warn!("⚠️ Channel {id} failed: {e}");
                    false
                }
            };
            (id, ok)
        });
        let result: DispatchResult = join_all(attempts).await.into_iter().collect();
        debug!(
            "Dispatched {} to {} channel(s), {} failed",
            notification.id,
            result.len(),
            result.failed().count()
        );
        result
    }

    /// One guarded attempt. Panics and timeouts come back as errors.
    async fn attempt_one(
        &self,
        channel: &dyn DeliveryChannel,
        notification: &Notification,
    ) -> Result<bool> {
        let attempt = AssertUnwindSafe(channel.attempt(notification)).catch_unwind();
        let outcome = match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| StrideError::Timeout(format!("no answer after {limit:?}")))?,
            None => attempt.await,
        };
        outcome.map_err(|_| StrideError::channel("panicked during delivery"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use stride_core::error::{Result, StrideError};
    use stride_core::types::NotificationKind;

    struct Fixed {
        id: &'static str,
        outcome: fn() -> Result<bool>,
    }

    #[async_trait]
    impl DeliveryChannel for Fixed {
        fn id(&self) -> &str {
            self.id
        }

        async fn attempt(&self, _notification: &Notification) -> Result<bool> {
            (self.outcome)()
        }
    }

    struct Panics;

    #[async_trait]
    impl DeliveryChannel for Panics {
        fn id(&self) -> &str {
            "panics"
        }

        async fn attempt(&self, _notification: &Notification) -> Result<bool> {
            panic!("channel bug");
        }
    }

    struct Hangs;

    #[async_trait]
    impl DeliveryChannel for Hangs {
        fn id(&self) -> &str {
            "hangs"
        }

        async fn attempt(&self, _notification: &Notification) -> Result<bool> {
            std::future::pending::<()>().await;
            Ok(true)
        }
    }

    fn note() -> Notification {
        Notification::new(NotificationKind::Goal, "Goal reached", "10k steps")
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(Fixed { id: "A", outcome: || Err(StrideError::channel("smtp down")) }),
            Arc::new(Fixed { id: "B", outcome: || Ok(true) }),
            Arc::new(Fixed { id: "C", outcome: || Ok(true) }),
        ];
        let result = ChannelDispatcher::new().dispatch(&note(), &channels).await;

        assert_eq!(result.get("A"), Some(false));
        assert_eq!(result.get("B"), Some(true));
        assert_eq!(result.get("C"), Some(true));
        assert!(!result.all_succeeded());
        assert_eq!(result.failed().collect::<Vec<_>>(), vec!["A"]);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(Panics),
            Arc::new(Fixed { id: "ok", outcome: || Ok(true) }),
        ];
        let result = ChannelDispatcher::new().dispatch(&note(), &channels).await;
        assert_eq!(result.get("panics"), Some(false));
        assert_eq!(result.get("ok"), Some(true));
    }

    #[tokio::test]
    async fn test_declined_delivery_is_false() {
        let channels: Vec<Arc<dyn DeliveryChannel>> =
            vec![Arc::new(Fixed { id: "quiet", outcome: || Ok(false) })];
        let result = ChannelDispatcher::new().dispatch(&note(), &channels).await;
        assert_eq!(result.get("quiet"), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_channel_failed() {
        let channels: Vec<Arc<dyn DeliveryChannel>> = vec![
            Arc::new(Hangs),
            Arc::new(Fixed { id: "ok", outcome: || Ok(true) }),
        ];
        let result = ChannelDispatcher::new()
            .with_timeout(Duration::from_secs(10))
            .dispatch(&note(), &channels)
            .await;
        assert_eq!(result.get("hangs"), Some(false));
        assert_eq!(result.get("ok"), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_errors_are_typed() {
        let dispatcher = ChannelDispatcher::new().with_timeout(Duration::from_secs(5));
        let err = dispatcher.attempt_one(&Hangs, &note()).await.unwrap_err();
        assert!(matches!(err, StrideError::Timeout(_)));

        let err = dispatcher.attempt_one(&Panics, &note()).await.unwrap_err();
        assert!(matches!(err, StrideError::Channel(_)));
    }

    #[tokio::test]
    async fn test_no_channels() {
        let result = ChannelDispatcher::new().dispatch(&note(), &[]).await;
        assert!(result.is_empty());
        assert!(result.all_succeeded());
    }
}
