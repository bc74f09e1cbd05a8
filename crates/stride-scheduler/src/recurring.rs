//! Self-rescheduling recurring triggers with catch-up after downtime.
//!
//! One registry serves both time-of-day reminders and calendar-cadence
//! maintenance such as backups. Entries are keyed by owner so logging an
//! owner out sweeps exactly that owner's timers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use stride_core::clock::{Clock, SharedClock};
use stride_core::error::Result;
use stride_core::types::Frequency;

/// Handle returned by [`RecurringScheduler::register`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScheduleHandle {
    id: u64,
    owner_id: String,
}

impl ScheduleHandle {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// Current timing of one registered trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    pub owner_id: String,
    pub frequency: Frequency,
    pub last_fired_at: DateTime<Utc>,
    pub next_fire_at: DateTime<Utc>,
}

/// Passed to the fire callback.
#[derive(Debug, Clone)]
pub struct FireEvent {
    pub handle: ScheduleHandle,
    pub fired_at: DateTime<Utc>,
    /// `true` for the immediate fire done at registration because the
    /// schedule was overdue.
    pub catch_up: bool,
}

pub type FireCallback = Arc<dyn Fn(FireEvent) + Send + Sync>;

struct Entry {
    schedule: Schedule,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<u64, Entry>,
}

impl Drop for Registry {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            if let Some(task) = &entry.task {
                task.abort();
            }
        }
    }
}

/// Owner-keyed registry of recurring triggers. Clones share the registry.
#[derive(Clone)]
pub struct RecurringScheduler {
    registry: Arc<Mutex<Registry>>,
    clock: SharedClock,
}

impl RecurringScheduler {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a trigger firing every `frequency` after `last_fired_at`.
    ///
    /// If the next fire time has already passed, `on_fire` runs once
    /// immediately and the cadence restarts from now. Nothing is armed when
    /// the interval cannot be computed.
    pub fn register<F>(
        &self,
        owner_id: impl Into<String>,
        frequency: Frequency,
        last_fired_at: DateTime<Utc>,
        on_fire: F,
    ) -> Result<ScheduleHandle>
    where
        F: Fn(FireEvent) + Send + Sync + 'static,
    {
        let due = frequency.advance(last_fired_at)?;
        self.register_at(owner_id, frequency, last_fired_at, due, on_fire)
    }

    /// Like [`register`](Self::register) with the first fire time given
    /// explicitly, for callers whose cadence follows local wall time.
    pub fn register_at<F>(
        &self,
        owner_id: impl Into<String>,
        frequency: Frequency,
        last_fired_at: DateTime<Utc>,
        due: DateTime<Utc>,
        on_fire: F,
    ) -> Result<ScheduleHandle>
    where
        F: Fn(FireEvent) + Send + Sync + 'static,
    {
        let owner_id = owner_id.into();
        let now = self.clock.now();

        let catch_up = due <= now;
        let (last, next) = if catch_up {
            (now, frequency.advance(now)?)
        } else {
            (last_fired_at, due)
        };

        let handle = {
            let mut registry = self.lock();
            registry.next_id += 1;
            let handle = ScheduleHandle {
                id: registry.next_id,
                owner_id: owner_id.clone(),
            };
            registry.entries.insert(
                handle.id,
                Entry {
                    schedule: Schedule {
                        owner_id: owner_id.clone(),
                        frequency,
                        last_fired_at: last,
                        next_fire_at: next,
                    },
                    task: None,
                },
            );
            handle
        };

        let on_fire: FireCallback = Arc::new(on_fire);
        if catch_up {
            info!("⏰ {owner_id}: {frequency} trigger overdue since {due}, firing now");
            on_fire(FireEvent {
                handle: handle.clone(),
                fired_at: now,
                catch_up: true,
            });
        }

        let mut registry = self.lock();
        // The catch-up callback may already have unregistered the owner.
        if let Some(entry) = registry.entries.get_mut(&handle.id) {
            let task = tokio::spawn(run_chain(
                Arc::downgrade(&self.registry),
                Arc::clone(&self.clock),
                handle.clone(),
                on_fire,
            ));
            entry.task = Some(task);
            debug!("{owner_id}: next {frequency} fire at {}", entry.schedule.next_fire_at);
        }
        Ok(handle)
    }

    /// Like [`register`](Self::register) with the frequency given as text,
    /// as it appears in configuration.
    pub fn register_named<F>(
        &self,
        owner_id: impl Into<String>,
        frequency: &str,
        last_fired_at: DateTime<Utc>,
        on_fire: F,
    ) -> Result<ScheduleHandle>
    where
        F: Fn(FireEvent) + Send + Sync + 'static,
    {
        let frequency: Frequency = frequency.parse()?;
        self.register(owner_id, frequency, last_fired_at, on_fire)
    }

    /// Cancel every trigger of `owner_id`. Returns how many were cancelled;
    /// unknown owners are a no-op.
    pub fn unregister(&self, owner_id: &str) -> usize {
        let mut registry = self.lock();
        let ids: Vec<u64> = registry
            .entries
            .iter()
            .filter(|(_, entry)| entry.schedule.owner_id == owner_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            if let Some(Entry { task: Some(task), .. }) = registry.entries.remove(id) {
                task.abort();
            }
        }
        if !ids.is_empty() {
            info!("Unregistered {} schedule(s) for {owner_id}", ids.len());
        }
        ids.len()
    }

    /// Cancel one trigger.
    pub fn cancel(&self, handle: &ScheduleHandle) -> bool {
        match self.lock().entries.remove(&handle.id) {
            Some(entry) => {
                if let Some(task) = entry.task {
                    task.abort();
                }
                true
            }
            None => false,
        }
    }

    /// Overwrite the timing of a trigger. The wait already in progress is
    /// not shortened, so call this from the trigger's own fire callback.
    pub fn reschedule(
        &self,
        handle: &ScheduleHandle,
        last_fired_at: DateTime<Utc>,
        next_fire_at: DateTime<Utc>,
    ) -> bool {
        let mut registry = self.lock();
        let Some(entry) = registry.entries.get_mut(&handle.id) else {
            return false;
        };
        entry.schedule.last_fired_at = last_fired_at;
        entry.schedule.next_fire_at = next_fire_at;
        debug!("{}: rescheduled to {next_fire_at}", handle.owner_id);
        true
    }

    pub fn schedule(&self, handle: &ScheduleHandle) -> Option<Schedule> {
        self.lock().entries.get(&handle.id).map(|e| e.schedule.clone())
    }

    pub fn schedules_for(&self, owner_id: &str) -> Vec<Schedule> {
        let registry = self.lock();
        let mut schedules: Vec<Schedule> = registry
            .entries
            .values()
            .filter(|e| e.schedule.owner_id == owner_id)
            .map(|e| e.schedule.clone())
            .collect();
        schedules.sort_by_key(|s| s.next_fire_at);
        schedules
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sleep until the entry's next fire time, fire, recompute, repeat. Exits
/// once the entry is gone from the registry.
async fn run_chain(
    registry: Weak<Mutex<Registry>>,
    clock: SharedClock,
    handle: ScheduleHandle,
    on_fire: FireCallback,
) {
    loop {
        let delay = {
            let Some(shared) = registry.upgrade() else { return };
            let guard = shared.lock().unwrap_or_else(|e| e.into_inner());
            let Some(entry) = guard.entries.get(&handle.id) else { return };
            (entry.schedule.next_fire_at - clock.now())
                .to_std()
                .unwrap_or(Duration::ZERO)
        };

        tokio::time::sleep(delay).await;

        let fired_at = {
            let Some(shared) = registry.upgrade() else { return };
            let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
            let Some(entry) = guard.entries.get_mut(&handle.id) else { return };
            let now = clock.now();
            match entry.schedule.frequency.advance(now) {
                Ok(next) => {
                    entry.schedule.last_fired_at = now;
                    entry.schedule.next_fire_at = next;
                    now
                }
                Err(e) => {
                    error!("{}: dropping schedule: {e}", handle.owner_id);
                    guard.entries.remove(&handle.id);
                    return;
                }
            }
        };

        debug!("{}: recurring trigger fired", handle.owner_id);
        on_fire(FireEvent {
            handle: handle.clone(),
            fired_at,
            catch_up: false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stride_core::clock::{Clock, ManualClock};
    use stride_core::error::StrideError;
    use chrono::TimeZone;

    fn setup() -> (RecurringScheduler, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 10, 12, 0, 0).unwrap());
        (RecurringScheduler::new(Arc::new(clock.clone())), clock)
    }

    fn counting() -> (Arc<AtomicUsize>, impl Fn(FireEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&count);
        (count, move |_| {
            hook.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_up_fires_once_and_rearms_from_now() {
        let (scheduler, clock) = setup();
        let now = clock.now();
        let (count, on_fire) = counting();

        let handle = scheduler
            .register("alex", Frequency::Daily, now - chrono::Duration::days(3), on_fire)
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let schedule = scheduler.schedule(&handle).unwrap();
        assert_eq!(schedule.last_fired_at, now);
        assert_eq!(schedule.next_fire_at, now + chrono::Duration::hours(24));

        // Nothing else fires before the new deadline.
        tokio::time::sleep(Duration::from_secs(23 * 3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clock.advance(chrono::Duration::hours(24));
        tokio::time::sleep(Duration::from_secs(3600 + 1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        let schedule = scheduler.schedule(&handle).unwrap();
        assert_eq!(schedule.next_fire_at, now + chrono::Duration::hours(48));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_overdue_waits() {
        let (scheduler, clock) = setup();
        let now = clock.now();
        let (count, on_fire) = counting();

        let handle = scheduler
            .register("alex", Frequency::Weekly, now - chrono::Duration::days(2), on_fire)
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(
            scheduler.schedule(&handle).unwrap().next_fire_at,
            now + chrono::Duration::days(5)
        );

        clock.advance(chrono::Duration::days(5));
        tokio::time::sleep(Duration::from_secs(5 * 86400 + 1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_catch_up_event_flagged() {
        let (scheduler, clock) = setup();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        scheduler
            .register("sam", Frequency::Monthly, clock.now() - chrono::Duration::days(40), move |event| {
                sink.lock().unwrap().push(event.catch_up);
            })
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_frequency_arms_nothing() {
        let (scheduler, clock) = setup();
        let (count, on_fire) = counting();
        let err = scheduler
            .register_named("alex", "hourly", clock.now() - chrono::Duration::days(3), on_fire)
            .unwrap_err();
        assert!(matches!(err, StrideError::InvalidFrequency(_)));
        assert!(scheduler.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_stops_chain() {
        let (scheduler, clock) = setup();
        let (count, on_fire) = counting();
        scheduler
            .register("alex", Frequency::Daily, clock.now(), on_fire)
            .unwrap();

        assert_eq!(scheduler.unregister("alex"), 1);
        assert_eq!(scheduler.unregister("alex"), 0);
        assert_eq!(scheduler.unregister("never-registered"), 0);

        clock.advance(chrono::Duration::days(2));
        tokio::time::sleep(Duration::from_secs(2 * 86400)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_only_touches_owner() {
        let (scheduler, clock) = setup();
        let now = clock.now();
        let (alex_count, alex_fire) = counting();
        let (sam_count, sam_fire) = counting();
        scheduler.register("alex", Frequency::Daily, now, alex_fire).unwrap();
        let sam = scheduler.register("sam", Frequency::Daily, now, sam_fire).unwrap();

        scheduler.unregister("alex");
        assert_eq!(scheduler.schedules_for("alex").len(), 0);
        assert!(scheduler.schedule(&sam).is_some());

        clock.advance(chrono::Duration::days(1));
        tokio::time::sleep(Duration::from_secs(86400 + 1)).await;
        assert_eq!(alex_count.load(Ordering::SeqCst), 0);
        assert_eq!(sam_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_single_handle() {
        let (scheduler, clock) = setup();
        let now = clock.now();
        let (_count, on_fire) = counting();
        let reminder = scheduler.register("alex", Frequency::Daily, now, on_fire).unwrap();
        let (_count2, on_fire2) = counting();
        scheduler.register("alex", Frequency::Weekly, now, on_fire2).unwrap();

        assert!(scheduler.cancel(&reminder));
        assert!(!scheduler.cancel(&reminder));
        let left = scheduler.schedules_for("alex");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].frequency, Frequency::Weekly);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_from_callback() {
        let (scheduler, clock) = setup();
        let now = clock.now();
        let anchor = now - chrono::Duration::hours(3);
        let inner = scheduler.clone();
        let handle = scheduler
            .register_at("alex", Frequency::Daily, now - chrono::Duration::days(4), now, move |event| {
                assert!(inner.reschedule(&event.handle, anchor, anchor + chrono::Duration::days(1)));
            })
            .unwrap();

        let schedule = scheduler.schedule(&handle).unwrap();
        assert_eq!(schedule.last_fired_at, anchor);
        assert_eq!(schedule.next_fire_at, anchor + chrono::Duration::days(1));

        assert!(scheduler.cancel(&handle));
        assert!(!scheduler.reschedule(&handle, now, now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_from_catch_up_callback() {
        let (scheduler, clock) = setup();
        let inner = scheduler.clone();
        let handle = scheduler
            .register("alex", Frequency::Daily, clock.now() - chrono::Duration::days(9), move |event| {
                inner.unregister(event.handle.owner_id());
            })
            .unwrap();
        assert!(scheduler.schedule(&handle).is_none());
        assert!(scheduler.is_empty());
    }
}
