//! Wall-clock source used for scheduling and quiet hours.

use chrono::{DateTime, Local, NaiveTime, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local time of day, used for quiet hours and reminder anchors.
    fn local_time(&self) -> NaiveTime {
        self.now().with_timezone(&Local).time()
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and dry runs. Local time is UTC unless overridden.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<(DateTime<Utc>, Option<NaiveTime>)>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { inner: Arc::new(Mutex::new((now, None))) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.0 = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.0 += by;
    }

    pub fn set_local_time(&self, time: NaiveTime) {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.1 = Some(time);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).0
    }

    fn local_time(&self) -> NaiveTime {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        guard.1.unwrap_or_else(|| guard.0.time())
    }
}
