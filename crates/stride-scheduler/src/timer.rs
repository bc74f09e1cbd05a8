//! Pausable countdown for one on-screen notification.
//!
//! Remaining time is always derived from `now - start_ref`, never from a
//! decrementing counter, so neither the wake-up cadence nor the number of
//! pause/resume toggles can make a timer drift.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug)]
struct TimerState {
    start_ref: Instant,
    duration: Duration,
    paused_at: Option<Instant>,
    cancelled: bool,
    fired: bool,
}

impl TimerState {
    fn elapsed(&self, now: Instant) -> Duration {
        let end = self.paused_at.unwrap_or(now);
        end.saturating_duration_since(self.start_ref)
    }
}

struct Shared {
    state: Mutex<TimerState>,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

enum Step {
    Expire,
    Stop,
    Wait(Option<Instant>),
}

/// A running countdown. Dropping it cancels it.
pub struct LifecycleTimer {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl LifecycleTimer {
    /// Start counting down `duration`; `on_expire` runs at most once.
    ///
    /// Must be called from inside a Tokio runtime.
    pub fn start<F>(duration: Duration, on_expire: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                start_ref: Instant::now(),
                duration,
                paused_at: None,
                cancelled: false,
                fired: false,
            }),
            wake: Notify::new(),
        });
        let task = tokio::spawn(run(Arc::clone(&shared), on_expire));
        Self { shared, task }
    }

    pub fn pause(&self) {
        let now = Instant::now();
        let mut state = self.shared.lock();
        if state.paused_at.is_some() || state.fired || state.cancelled {
            return;
        }
        state.paused_at = Some(now);
        drop(state);
        self.shared.wake.notify_one();
    }

    pub fn resume(&self) {
        let now = Instant::now();
        let mut state = self.shared.lock();
        let Some(paused_at) = state.paused_at.take() else {
            return;
        };
        state.start_ref += now.saturating_duration_since(paused_at);
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Prevent `on_expire` from running. Wins over any expiry not yet observed.
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        state.cancelled = true;
        drop(state);
        self.task.abort();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock().paused_at.is_some()
    }

    pub fn has_fired(&self) -> bool {
        self.shared.lock().fired
    }

    pub fn remaining(&self) -> Duration {
        let state = self.shared.lock();
        state.duration.saturating_sub(state.elapsed(Instant::now()))
    }

    /// Fraction of the lifetime used so far, `0.0..=1.0`. For progress bars.
    pub fn progress(&self) -> f32 {
        let state = self.shared.lock();
        if state.duration.is_zero() {
            return 1.0;
        }
        let elapsed = state.elapsed(Instant::now());
        (elapsed.as_secs_f64() / state.duration.as_secs_f64()).min(1.0) as f32
    }
}

impl Drop for LifecycleTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for LifecycleTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleTimer")
            .field("state", &*self.shared.lock())
            .finish()
    }
}

async fn run<F: FnOnce()>(shared: Arc<Shared>, on_expire: F) {
    loop {
        let step = {
            let mut state = shared.lock();
            if state.cancelled {
                Step::Stop
            } else if state.paused_at.is_some() {
                Step::Wait(None)
            } else if state.elapsed(Instant::now()) >= state.duration {
                state.fired = true;
                Step::Expire
            } else {
                Step::Wait(Some(state.start_ref + state.duration))
            }
        };

        match step {
            Step::Expire => break,
            Step::Stop => return,
            Step::Wait(None) => shared.wake.notified().await,
            Step::Wait(Some(deadline)) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    _ = shared.wake.notified() => {}
                }
            }
        }
    }

    on_expire();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&fired);
        (fired, move || {
            hook.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_duration() {
        let (fired, on_expire) = counter();
        let timer = LifecycleTimer::start(Duration::from_millis(5000), on_expire);

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(timer.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_preserves_elapsed_time() {
        let (fired, on_expire) = counter();
        let timer = LifecycleTimer::start(Duration::from_millis(5000), on_expire);

        tokio::time::sleep(Duration::from_millis(2000)).await;
        timer.pause();
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(timer.remaining(), Duration::from_millis(3000));
        timer.resume();

        // Expires at t=8000, not t=5000.
        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_toggles_do_not_drift() {
        let (fired, on_expire) = counter();
        let timer = LifecycleTimer::start(Duration::from_millis(1050), on_expire);

        // 10 x (100ms running + 50ms paused): 1000ms of running time.
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            timer.pause();
            timer.pause();
            tokio::time::sleep(Duration::from_millis(50)).await;
            timer.resume();
            timer.resume();
        }
        tokio::time::sleep(Duration::from_millis(49)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_wins() {
        let (fired, on_expire) = counter();
        let timer = LifecycleTimer::start(Duration::from_millis(100), on_expire);

        tokio::time::sleep(Duration::from_millis(50)).await;
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_deadline_before_observed() {
        let (fired, on_expire) = counter();
        // Already due, but the timer task has not been polled yet.
        let timer = LifecycleTimer::start(Duration::ZERO, on_expire);
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (fired, on_expire) = counter();
        let timer = LifecycleTimer::start(Duration::from_millis(100), on_expire);
        drop(timer);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress() {
        let (_fired, on_expire) = counter();
        let timer = LifecycleTimer::start(Duration::from_millis(1000), on_expire);
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!((timer.progress() - 0.25).abs() < 1e-6);
        timer.pause();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!((timer.progress() - 0.25).abs() < 1e-6);
    }
}
