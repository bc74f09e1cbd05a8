//! Bounded, priority-ordered notification queue.
//!
//! [`QueueState`] holds the pure transitions over `{active, pending}`.
//! [`NotificationQueue`] wraps it behind a mutex, owns the lifecycle timers
//! and snooze timers, and publishes the active list on a watch channel.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use stride_core::clock::{Clock, SharedClock, SystemClock};
use stride_core::types::{Notification, NotificationId};

use crate::timer::LifecycleTimer;

/// Where an enqueued notification landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Active,
    /// Index in the pending list at insertion time.
    Pending(usize),
    /// The id is already queued; nothing changed.
    Duplicate,
}

/// Result of removing an id.
#[derive(Debug, Default)]
pub struct Removal {
    pub removed: Option<Notification>,
    pub promoted: Option<Notification>,
}

/// Active and pending lists plus the admission limit.
///
/// Invariants: `active.len() <= max_concurrent`; `pending` is sorted by
/// priority descending and FIFO within a priority; an id is in at most one list.
#[derive(Debug, Clone)]
pub struct QueueState {
    active: Vec<Notification>,
    pending: VecDeque<Notification>,
    max_concurrent: usize,
}

impl QueueState {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            active: Vec::new(),
            pending: VecDeque::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn active(&self) -> &[Notification] {
        &self.active
    }

    pub fn pending(&self) -> impl Iterator<Item = &Notification> {
        self.pending.iter()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn contains(&self, id: NotificationId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.active
            .iter()
            .chain(self.pending.iter())
            .find(|n| n.id == id)
    }

    pub fn is_active(&self, id: NotificationId) -> bool {
        self.active.iter().any(|n| n.id == id)
    }

    /// Admit into `active` if there is room, otherwise into `pending` at the
    /// end of its priority bucket.
    pub fn admit(&mut self, notification: Notification) -> Placement {
        if self.contains(notification.id) {
            return Placement::Duplicate;
        }
        if self.active.len() < self.max_concurrent {
            self.active.push(notification);
            return Placement::Active;
        }
        let at = self
            .pending
            .partition_point(|queued| queued.priority >= notification.priority);
        self.pending.insert(at, notification);
        Placement::Pending(at)
    }

    /// Remove `id` from whichever list holds it and promote the head of
    /// `pending` if that frees a slot. Unknown ids change nothing.
    pub fn remove(&mut self, id: NotificationId) -> Removal {
        let removed = if let Some(pos) = self.active.iter().position(|n| n.id == id) {
            Some(self.active.remove(pos))
        } else if let Some(pos) = self.pending.iter().position(|n| n.id == id) {
            self.pending.remove(pos)
        } else {
            None
        };

        if removed.is_none() {
            return Removal::default();
        }

        let mut promoted = None;
        if self.active.len() < self.max_concurrent {
            if let Some(next) = self.pending.pop_front() {
                self.active.push(next.clone());
                promoted = Some(next);
            }
        }
        Removal { removed, promoted }
    }

    /// Empty both lists, returning everything that was queued.
    pub fn clear(&mut self) -> Vec<Notification> {
        let mut drained: Vec<Notification> = self.active.drain(..).collect();
        drained.extend(self.pending.drain(..));
        drained
    }
}

/// Point-in-time copy of the queue for inspection.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub active: Vec<Notification>,
    pub pending: Vec<Notification>,
}

struct ArmedTimer {
    generation: u64,
    timer: LifecycleTimer,
}

struct QueueInner {
    state: QueueState,
    timers: HashMap<NotificationId, ArmedTimer>,
    snoozes: HashMap<u64, JoinHandle<()>>,
    next_token: u64,
    view: watch::Sender<Vec<Notification>>,
    clock: SharedClock,
}

impl QueueInner {
    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn publish(&self) {
        self.view.send_replace(self.state.active().to_vec());
    }
}

impl Drop for QueueInner {
    fn drop(&mut self) {
        for (_, handle) in self.snoozes.drain() {
            handle.abort();
        }
    }
}

/// Thread-safe queue handle. Clones share the same queue.
///
/// Timed notifications spawn Tokio tasks, so mutate it from inside a runtime.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl NotificationQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_clock(max_concurrent, Arc::new(SystemClock))
    }

    /// Queue whose re-queued snoozes are stamped by `clock`.
    pub fn with_clock(max_concurrent: usize, clock: SharedClock) -> Self {
        let (view, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                state: QueueState::new(max_concurrent),
                timers: HashMap::new(),
                snoozes: HashMap::new(),
                next_token: 0,
                view,
                clock,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn weak(&self) -> Weak<Mutex<QueueInner>> {
        Arc::downgrade(&self.inner)
    }

    pub fn enqueue(&self, notification: Notification) -> Placement {
        let weak = self.weak();
        let mut inner = self.lock();
        enqueue_locked(&mut inner, &weak, notification)
    }

    /// Dismiss `id`. Returns `false` if it was not queued.
    pub fn remove(&self, id: NotificationId) -> bool {
        let weak = self.weak();
        let mut inner = self.lock();
        remove_locked(&mut inner, &weak, id).is_some()
    }

    /// Remove `id` now and re-enqueue a copy with a fresh id after `delay`.
    pub fn snooze(&self, id: NotificationId, delay: Duration) -> bool {
        let weak = self.weak();
        let mut inner = self.lock();
        let Some(original) = remove_locked(&mut inner, &weak, id) else {
            return false;
        };

        let token = inner.token();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
            if inner.snoozes.remove(&token).is_none() {
                return;
            }
            let again = original.respawn(inner.clock.now());
            debug!("Snooze elapsed for {}, re-queued as {}", original.id, again.id);
            enqueue_locked(&mut inner, &weak, again);
        });
        inner.snoozes.insert(token, handle);
        debug!("Snoozed {id} for {delay:?}");
        true
    }

    pub fn pause(&self, id: NotificationId) {
        if let Some(armed) = self.lock().timers.get(&id) {
            armed.timer.pause();
        }
    }

    pub fn resume(&self, id: NotificationId) {
        if let Some(armed) = self.lock().timers.get(&id) {
            armed.timer.resume();
        }
    }

    /// Cancel every timer (lifecycle and snooze) and empty the queue.
    pub fn clear(&self) {
        let mut inner = self.lock();
        for (_, armed) in inner.timers.drain() {
            armed.timer.cancel();
        }
        for (_, handle) in inner.snoozes.drain() {
            handle.abort();
        }
        let dropped = inner.state.clear();
        inner.publish();
        debug!("Queue cleared ({} notifications)", dropped.len());
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.lock().state.get(id).cloned()
    }

    pub fn contains(&self, id: NotificationId) -> bool {
        self.lock().state.contains(id)
    }

    /// Display time left for an active notification with a timer.
    pub fn remaining(&self, id: NotificationId) -> Option<Duration> {
        self.lock().timers.get(&id).map(|armed| armed.timer.remaining())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.lock();
        QueueSnapshot {
            active: inner.state.active().to_vec(),
            pending: inner.state.pending().cloned().collect(),
        }
    }

    pub fn active_len(&self) -> usize {
        self.lock().state.active().len()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().state.pending_len()
    }

    pub fn snoozed_len(&self) -> usize {
        self.lock().snoozes.len()
    }

    /// Read-only, change-notified view of the active list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.lock().view.subscribe()
    }

    /// Timer expiry path. A stale generation means the id was removed (and
    /// possibly re-queued) after this timer was armed.
    fn expire(&self, id: NotificationId, generation: u64) {
        let weak = self.weak();
        let mut inner = self.lock();
        match inner.timers.get(&id) {
            Some(armed) if armed.generation == generation => {}
            _ => return,
        }
        debug!("Notification {id} expired");
        remove_locked(&mut inner, &weak, id);
    }
}

fn enqueue_locked(
    inner: &mut QueueInner,
    weak: &Weak<Mutex<QueueInner>>,
    notification: Notification,
) -> Placement {
    let id = notification.id;
    let lifetime = notification.lifetime();
    let placement = inner.state.admit(notification);
    match placement {
        Placement::Active => {
            arm(inner, weak, id, lifetime);
            inner.publish();
        }
        Placement::Pending(at) => debug!("Queue full, {id} pending at #{at}"),
        Placement::Duplicate => debug!("{id} already queued, ignoring"),
    }
    placement
}

fn remove_locked(
    inner: &mut QueueInner,
    weak: &Weak<Mutex<QueueInner>>,
    id: NotificationId,
) -> Option<Notification> {
    if let Some(armed) = inner.timers.remove(&id) {
        armed.timer.cancel();
    }
    let removal = inner.state.remove(id);
    if let Some(promoted) = &removal.promoted {
        debug!("Promoted {} from pending", promoted.id);
        arm(inner, weak, promoted.id, promoted.lifetime());
    }
    if removal.removed.is_some() {
        inner.publish();
    }
    removal.removed
}

fn arm(
    inner: &mut QueueInner,
    weak: &Weak<Mutex<QueueInner>>,
    id: NotificationId,
    lifetime: Option<Duration>,
) {
    let Some(lifetime) = lifetime else {
        return;
    };
    let generation = inner.token();
    let weak = weak.clone();
    let timer = LifecycleTimer::start(lifetime, move || {
        if let Some(shared) = weak.upgrade() {
            NotificationQueue { inner: shared }.expire(id, generation);
        }
    });
    if let Some(previous) = inner.timers.insert(id, ArmedTimer { generation, timer }) {
        previous.timer.cancel();
    }
}
