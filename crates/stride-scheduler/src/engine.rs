//! The notification engine: one entry point for producers.
//!
//! Wires the in-app queue, the recurring scheduler and channel dispatch
//! together. Producers call [`NotifyEngine::notify`]; the UI watches
//! [`NotifyEngine::subscribe`] and reports dismissals and hovers back.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use stride_core::clock::{Clock, SharedClock, SystemClock};
use stride_core::config::{Position, QueueConfig, StrideConfig};
use stride_core::error::Result;
use stride_core::traits::{DeliveryChannel, DeliverySettings, SettingsSource, StaticSettings};
use stride_core::types::{Frequency, Notification, NotificationId, NotificationKind};

use crate::dispatch::{ChannelDispatcher, DispatchResult};
use crate::queue::{NotificationQueue, Placement, QueueSnapshot};
use crate::recurring::{FireEvent, RecurringScheduler, ScheduleHandle};

/// What happened to a channel-backed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent(DispatchResult),
    /// Held back by quiet hours; no channel was attempted.
    QuietHours,
}

impl DispatchOutcome {
    pub fn result(&self) -> Option<&DispatchResult> {
        match self {
            DispatchOutcome::Sent(result) => Some(result),
            DispatchOutcome::QuietHours => None,
        }
    }
}

/// Returned by [`NotifyEngine::notify`].
#[derive(Debug)]
pub struct NotifyReceipt {
    pub id: NotificationId,
    pub placement: Placement,
    /// Present when the notification targets external channels.
    pub dispatch: Option<JoinHandle<DispatchOutcome>>,
}

struct EngineInner {
    queue: NotificationQueue,
    scheduler: RecurringScheduler,
    dispatcher: ChannelDispatcher,
    channels: RwLock<BTreeMap<String, Arc<dyn DeliveryChannel>>>,
    settings: Arc<dyn SettingsSource>,
    clock: SharedClock,
    queue_config: QueueConfig,
}

/// Cheap to clone; clones share the same queue, schedules and channels.
#[derive(Clone)]
pub struct NotifyEngine {
    inner: Arc<EngineInner>,
}

/// Non-owning handle for callbacks that must not keep the engine alive.
#[derive(Clone)]
pub struct WeakNotifyEngine {
    inner: Weak<EngineInner>,
}

impl WeakNotifyEngine {
    pub fn upgrade(&self) -> Option<NotifyEngine> {
        self.inner.upgrade().map(|inner| NotifyEngine { inner })
    }
}

pub struct EngineBuilder {
    queue_config: QueueConfig,
    settings: Option<Arc<dyn SettingsSource>>,
    clock: Option<SharedClock>,
    scheduler: Option<RecurringScheduler>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
    dispatch_timeout: Option<Duration>,
}

impl EngineBuilder {
    pub fn settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share a scheduler with other components instead of creating one.
    pub fn scheduler(mut self, scheduler: RecurringScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = Arc<dyn DeliveryChannel>>) -> Self {
        self.channels.extend(channels);
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> NotifyEngine {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| RecurringScheduler::new(Arc::clone(&clock)));
        let settings = self
            .settings
            .unwrap_or_else(|| Arc::new(StaticSettings::new(DeliverySettings::default())));
        let mut dispatcher = ChannelDispatcher::new();
        if let Some(timeout) = self.dispatch_timeout {
            dispatcher = dispatcher.with_timeout(timeout);
        }
        let channels = self
            .channels
            .into_iter()
            .map(|c| (c.id().to_string(), c))
            .collect();

        info!(
            "🔔 Notify engine ready (max {} on screen, {}ms default timeout)",
            self.queue_config.max_concurrent, self.queue_config.default_timeout_ms
        );
        NotifyEngine {
            inner: Arc::new(EngineInner {
                queue: NotificationQueue::with_clock(self.queue_config.max_concurrent, Arc::clone(&clock)),
                scheduler,
                dispatcher,
                channels: RwLock::new(channels),
                settings,
                clock,
                queue_config: self.queue_config,
            }),
        }
    }
}

impl NotifyEngine {
    pub fn builder(queue_config: QueueConfig) -> EngineBuilder {
        EngineBuilder {
            queue_config,
            settings: None,
            clock: None,
            scheduler: None,
            channels: vec![],
            dispatch_timeout: None,
        }
    }

    /// Engine with queue settings and static delivery settings from `config`.
    pub fn from_config(config: &StrideConfig) -> Self {
        Self::builder(config.queue.clone())
            .settings(Arc::new(StaticSettings::new(DeliverySettings::from_config(config))))
            .build()
    }

    pub fn downgrade(&self) -> WeakNotifyEngine {
        WeakNotifyEngine {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// A notification carrying the configured default priority, stamped by
    /// the engine clock.
    pub fn build(
        &self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Notification {
        Notification::new(kind, title, message)
            .with_priority(self.inner.queue_config.default_priority)
            .with_created_at(self.inner.clock.now())
    }

    /// Show `notification` in-app and, if it names channels, deliver it
    /// externally at the same time. Must be called inside a Tokio runtime.
    pub fn notify(&self, mut notification: Notification) -> NotifyReceipt {
        if notification.timeout_ms.is_none() {
            notification.timeout_ms = Some(self.inner.queue_config.default_timeout_ms);
        }
        let id = notification.id;
        let placement = self.inner.queue.enqueue(notification.clone());
        debug!("Notification {id} ({}) placed {placement:?}", notification.kind);

        let dispatch = if notification.is_channel_backed() && placement != Placement::Duplicate {
            let engine = self.clone();
            Some(tokio::spawn(async move { engine.dispatch_now(&notification).await }))
        } else {
            None
        };

        NotifyReceipt { id, placement, dispatch }
    }

    /// Deliver to the notification's channels that are registered and
    /// enabled right now, unless quiet hours are in effect.
    pub async fn dispatch_now(&self, notification: &Notification) -> DispatchOutcome {
        let Some(settings) = self.delivery_settings().await else {
            warn!("⚠️ Delivery settings unavailable, no channel attempted for {}", notification.id);
            return DispatchOutcome::Sent(DispatchResult::default());
        };
        if settings.quiet_hours.is_quiet(self.inner.clock.local_time()) {
            info!("🌙 Quiet hours: holding back channel delivery of {}", notification.id);
            return DispatchOutcome::QuietHours;
        }

        let targets: Vec<Arc<dyn DeliveryChannel>> = {
            let channels = self.inner.channels.read().unwrap_or_else(|e| e.into_inner());
            notification
                .channel_targets
                .iter()
                .filter_map(|id| match channels.get(id) {
                    Some(_) if !settings.is_enabled(id) => {
                        debug!("Channel {id} disabled, skipping");
                        None
                    }
                    Some(channel) => Some(Arc::clone(channel)),
                    None => {
                        debug!("Channel {id} not registered, skipping");
                        None
                    }
                })
                .collect()
        };

        DispatchOutcome::Sent(self.inner.dispatcher.dispatch(notification, &targets).await)
    }

    /// Fresh settings, read on the blocking pool when the source does I/O.
    async fn delivery_settings(&self) -> Option<DeliverySettings> {
        let source = Arc::clone(&self.inner.settings);
        if !source.is_blocking() {
            return Some(source.snapshot());
        }
        match tokio::task::spawn_blocking(move || source.snapshot()).await {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("⚠️ Settings snapshot task failed: {e}");
                None
            }
        }
    }

    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.inner.queue.remove(id)
    }

    /// Hide now and bring back a copy under a new id after `delay`.
    pub fn snooze(&self, id: NotificationId, delay: Duration) -> bool {
        self.inner.queue.snooze(id, delay)
    }

    pub fn pause(&self, id: NotificationId) {
        self.inner.queue.pause(id);
    }

    pub fn resume(&self, id: NotificationId) {
        self.inner.queue.resume(id);
    }

    pub fn clear(&self) {
        self.inner.queue.clear();
    }

    /// Run action `index` of notification `id`, then dismiss it.
    /// Returns `false` when either is unknown.
    pub fn invoke_action(&self, id: NotificationId, index: usize) -> bool {
        let Some(notification) = self.inner.queue.get(id) else {
            return false;
        };
        let Some(action) = notification.actions.get(index) else {
            return false;
        };
        debug!("Action '{}' on {id}", action.label);
        if let Some(handler) = &action.on_invoke {
            handler(&notification);
        }
        self.dismiss(id);
        true
    }

    /// Fire a copy of `template` through [`notify`](Self::notify) every
    /// `frequency`, catching up once if overdue.
    pub fn register_recurring(
        &self,
        owner_id: &str,
        frequency: Frequency,
        last_fired_at: DateTime<Utc>,
        template: Notification,
    ) -> Result<ScheduleHandle> {
        let engine = self.downgrade();
        self.inner
            .scheduler
            .register(owner_id, frequency, last_fired_at, move |event: FireEvent| {
                if let Some(engine) = engine.upgrade() {
                    engine.notify(template.respawn(event.fired_at));
                }
            })
    }

    /// Cancel every recurring trigger of `owner_id`, e.g. on logout.
    pub fn shutdown_owner(&self, owner_id: &str) -> usize {
        self.inner.scheduler.unregister(owner_id)
    }

    pub fn register_channel(&self, channel: Arc<dyn DeliveryChannel>) {
        let id = channel.id().to_string();
        let mut channels = self.inner.channels.write().unwrap_or_else(|e| e.into_inner());
        if channels.insert(id.clone(), channel).is_some() {
            debug!("Replaced channel {id}");
        }
    }

    pub fn channel_ids(&self) -> Vec<String> {
        let channels = self.inner.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.keys().cloned().collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.queue.subscribe()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.queue.snapshot()
    }

    pub fn remaining(&self, id: NotificationId) -> Option<Duration> {
        self.inner.queue.remaining(id)
    }

    pub fn position(&self) -> Position {
        self.inner.queue_config.position
    }

    pub fn scheduler(&self) -> &RecurringScheduler {
        &self.inner.scheduler
    }

    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeZone};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stride_core::clock::{Clock, ManualClock};
    use stride_core::error::StrideError;
    use stride_core::types::{NotificationAction, Priority, QuietHours};

    struct Recording {
        id: &'static str,
        fail: bool,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DeliveryChannel for Recording {
        fn id(&self) -> &str {
            self.id
        }

        async fn attempt(&self, notification: &Notification) -> Result<bool> {
            self.seen.lock().unwrap().push(notification.title.clone());
            if self.fail {
                return Err(StrideError::channel("unreachable"));
            }
            Ok(true)
        }
    }

    struct Fixture {
        engine: NotifyEngine,
        settings: Arc<StaticSettings>,
        clock: ManualClock,
        seen: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap());
        let settings = Arc::new(StaticSettings::default());
        let seen = Arc::new(Mutex::new(vec![]));
        let engine = NotifyEngine::builder(QueueConfig::default())
            .clock(Arc::new(clock.clone()))
            .settings(settings.clone())
            .channel(Arc::new(Recording { id: "A", fail: true, seen: seen.clone() }))
            .channel(Arc::new(Recording { id: "B", fail: false, seen: seen.clone() }))
            .channel(Arc::new(Recording { id: "C", fail: false, seen: seen.clone() }))
            .build();
        Fixture { engine, settings, clock, seen }
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_applies_default_timeout() {
        let f = fixture();
        let n = f.engine.build(NotificationKind::Habit, "Stretch", "Time to stretch");
        let receipt = f.engine.notify(n);
        assert_eq!(receipt.placement, Placement::Active);
        assert!(receipt.dispatch.is_none());

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(f.engine.snapshot().active.len(), 1);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(f.engine.snapshot().active.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_isolates_failures() {
        let f = fixture();
        let n = f
            .engine
            .build(NotificationKind::Achievement, "Streak!", "7 days in a row")
            .with_channels(["A", "B", "C"]);
        let receipt = f.engine.notify(n);
        let outcome = receipt.dispatch.unwrap().await.unwrap();

        let result = outcome.result().unwrap();
        assert_eq!(result.get("A"), Some(false));
        assert_eq!(result.get("B"), Some(true));
        assert_eq!(result.get("C"), Some(true));
        assert_eq!(f.seen.lock().unwrap().len(), 3);
        // In-app display is independent of delivery.
        assert!(f.engine.snapshot().active.iter().any(|a| a.id == receipt.id));
    }

    #[tokio::test]
    async fn test_disabled_and_unknown_channels_skipped() {
        let f = fixture();
        f.settings.set_enabled("B", false);
        let n = f
            .engine
            .build(NotificationKind::Goal, "Goal", "Halfway there")
            .with_channels(["B", "C", "push"]);
        let outcome = f.engine.dispatch_now(&n).await;
        let result = outcome.result().unwrap();
        assert_eq!(result.get("B"), None);
        assert_eq!(result.get("push"), None);
        assert_eq!(result.get("C"), Some(true));

        // Re-enabling applies to the very next dispatch.
        f.settings.set_enabled("B", true);
        let outcome = f.engine.dispatch_now(&n).await;
        assert_eq!(outcome.result().unwrap().get("B"), Some(true));
    }

    #[tokio::test]
    async fn test_quiet_hours_hold_back_channels() {
        let f = fixture();
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        f.settings.set_quiet_hours(QuietHours::new(t(22, 0), t(8, 0)));
        f.clock.set_local_time(t(23, 30));

        let n = f
            .engine
            .build(NotificationKind::Reminder, "Water", "Drink a glass")
            .with_channel("B");
        let receipt = f.engine.notify(n.clone());
        assert_eq!(receipt.dispatch.unwrap().await.unwrap(), DispatchOutcome::QuietHours);
        assert!(f.seen.lock().unwrap().is_empty());
        assert_eq!(f.engine.snapshot().active.len(), 1);

        f.clock.set_local_time(t(9, 0));
        assert!(f.engine.dispatch_now(&n).await.result().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_action_runs_handler_and_dismisses() {
        let f = fixture();
        let clicks = Arc::new(AtomicUsize::new(0));
        let hook = clicks.clone();
        let n = f
            .engine
            .build(NotificationKind::Habit, "Meditate", "10 minutes")
            .with_action(NotificationAction::primary("Start").on_invoke(move |_| {
                hook.fetch_add(1, Ordering::SeqCst);
            }))
            .with_action(NotificationAction::new("Later"));
        let id = f.engine.notify(n).id;

        assert!(!f.engine.invoke_action(id, 5));
        assert!(f.engine.invoke_action(id, 0));
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert!(f.engine.snapshot().active.is_empty());
        assert!(!f.engine.invoke_action(id, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snooze_through_engine() {
        let f = fixture();
        let n = f
            .engine
            .build(NotificationKind::Reminder, "Walk", "Go outside")
            .with_priority(Priority::High);
        assert_eq!(n.created_at, f.clock.now());
        let id = f.engine.notify(n).id;
        assert!(f.engine.snooze(id, Duration::from_secs(600)));
        assert!(f.engine.snapshot().active.is_empty());

        f.clock.advance(chrono::Duration::minutes(10));
        tokio::time::sleep(Duration::from_secs(601)).await;
        let active = f.engine.snapshot().active;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].title, "Walk");
        assert_ne!(active[0].id, id);
        assert_eq!(active[0].created_at, f.clock.now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_recurring_and_shutdown_owner() {
        let f = fixture();
        let template = f
            .engine
            .build(NotificationKind::Reminder, "Weekly review", "Plan the week")
            .persistent();
        let last = f.clock.now() - chrono::Duration::days(8);
        f.engine
            .register_recurring("alex", Frequency::Weekly, last, template)
            .unwrap();
        // Overdue, so it caught up immediately.
        let active = f.engine.snapshot().active;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].created_at, f.clock.now());

        assert_eq!(f.engine.shutdown_owner("alex"), 1);
        assert_eq!(f.engine.shutdown_owner("alex"), 0);
        assert!(f.engine.scheduler().is_empty());
    }

    struct DiskSettings {
        read_on: Mutex<Option<std::thread::ThreadId>>,
    }

    impl SettingsSource for DiskSettings {
        fn snapshot(&self) -> DeliverySettings {
            *self.read_on.lock().unwrap() = Some(std::thread::current().id());
            DeliverySettings::default()
        }

        fn is_blocking(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_blocking_settings_read_off_runtime_thread() {
        let settings = Arc::new(DiskSettings { read_on: Mutex::new(None) });
        let seen = Arc::new(Mutex::new(vec![]));
        let engine = NotifyEngine::builder(QueueConfig::default())
            .settings(settings.clone())
            .channel(Arc::new(Recording { id: "B", fail: false, seen: seen.clone() }))
            .build();
        let n = engine.build(NotificationKind::Goal, "Goal", "Done").with_channel("B");

        let outcome = engine.dispatch_now(&n).await;
        assert_eq!(outcome.result().unwrap().get("B"), Some(true));
        let read_on = settings.read_on.lock().unwrap().unwrap();
        assert_ne!(read_on, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_duplicate_notify_does_not_redispatch() {
        let f = fixture();
        let n = f
            .engine
            .build(NotificationKind::Goal, "Once", "only once")
            .with_channel("B");
        let first = f.engine.notify(n.clone());
        first.dispatch.unwrap().await.unwrap();
        let second = f.engine.notify(n);
        assert_eq!(second.placement, Placement::Duplicate);
        assert!(second.dispatch.is_none());
        assert_eq!(f.seen.lock().unwrap().len(), 1);
    }
}
