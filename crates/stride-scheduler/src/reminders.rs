//! Configured time-of-day reminders ("log your meals at 20:00").
//!
//! Reminders stay pinned to their local wall time. After every fire,
//! catch-up included, the trigger is re-anchored to the latest `at`
//! occurrence and the next one is computed on the local calendar, so
//! neither late fires nor DST changes move the time of day.

use chrono::{DateTime, Months, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use stride_core::clock::Clock;
use stride_core::config::ReminderConfig;
use stride_core::error::{Result, StrideError};
use stride_core::types::{Frequency, Notification, NotificationKind, Priority, parse_hhmm};

use crate::engine::NotifyEngine;
use crate::recurring::{FireEvent, ScheduleHandle};
use crate::store::{StateStore, reminder_key};

/// A validated reminder ready to register.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: String,
    pub title: String,
    pub message: String,
    pub at: NaiveTime,
    pub frequency: Frequency,
    pub priority: Priority,
    pub channels: Vec<String>,
}

impl Reminder {
    pub fn from_config(config: &ReminderConfig) -> Result<Self> {
        Ok(Self {
            id: config.id.clone(),
            title: config.title.clone(),
            message: config.message.clone(),
            at: parse_hhmm(&config.at)?,
            frequency: config.frequency.parse()?,
            priority: config.priority,
            channels: config.channels.clone(),
        })
    }

    /// The notification shown each time the reminder fires.
    pub fn template(&self) -> Notification {
        Notification::new(NotificationKind::Reminder, &self.title, &self.message)
            .with_priority(self.priority)
            .with_channels(self.channels.iter().cloned())
            .with_payload("reminder_id", serde_json::Value::String(self.id.clone()))
    }
}

/// A fire landing this much before the wall-clock time still counts for it.
const EARLY_FIRE_SLACK: chrono::Duration = chrono::Duration::minutes(1);

/// Local wall time in `tz` as an instant. A time skipped by a DST jump
/// resolves to one hour later.
fn resolve_local<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(naive + chrono::Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Most recent instant at or before `now` whose local wall time in `tz` is `at`.
///
/// A time skipped by a DST jump resolves to one hour later.
pub fn previous_occurrence<Tz: TimeZone>(now: DateTime<Utc>, at: NaiveTime, tz: &Tz) -> DateTime<Utc> {
    let local_now = now.with_timezone(tz).naive_local();
    let mut date = local_now.date();
    if date.and_time(at) > local_now {
        date = date.pred_opt().unwrap_or(date);
    }
    resolve_local(date.and_time(at), tz)
}

/// The `at` occurrence one `frequency` step after the local date of `after`.
///
/// Steps are taken on the local calendar, so a daily reminder stays at the
/// same wall time across DST changes. Monthly steps clamp like
/// [`Frequency::advance`].
pub fn next_occurrence<Tz: TimeZone>(
    after: DateTime<Utc>,
    at: NaiveTime,
    frequency: Frequency,
    tz: &Tz,
) -> Result<DateTime<Utc>> {
    let date = after.with_timezone(tz).date_naive();
    let next = match frequency {
        Frequency::Daily => date.succ_opt(),
        Frequency::Weekly => date.checked_add_days(chrono::Days::new(7)),
        Frequency::Monthly => date.checked_add_months(Months::new(1)),
    };
    let next = next.ok_or_else(|| {
        StrideError::schedule(format!("{frequency} step from {date} is out of range"))
    })?;
    Ok(resolve_local(next.and_time(at), tz))
}

/// Register every enabled reminder for `owner_id`. Invalid entries are
/// logged and skipped so one typo does not disable the rest.
pub fn register_reminders<Tz>(
    engine: &NotifyEngine,
    store: &Arc<StateStore>,
    owner_id: &str,
    reminders: &[ReminderConfig],
    tz: &Tz,
) -> Vec<ScheduleHandle>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    let mut handles = Vec::new();
    for config in reminders.iter().filter(|r| r.enabled) {
        match register_reminder(engine, store, owner_id, config, tz) {
            Ok(handle) => handles.push(handle),
            Err(e) => warn!("⚠️ Skipping reminder '{}': {e}", config.id),
        }
    }
    info!("⏰ {} reminder(s) registered for {owner_id}", handles.len());
    handles
}

/// Register one reminder. The first fire follows the occurrence covered by
/// the stored last fire, or the latest past `at` occurrence for a reminder
/// that never fired.
pub fn register_reminder<Tz>(
    engine: &NotifyEngine,
    store: &Arc<StateStore>,
    owner_id: &str,
    config: &ReminderConfig,
    tz: &Tz,
) -> Result<ScheduleHandle>
where
    Tz: TimeZone + Send + Sync + 'static,
{
    let reminder = Reminder::from_config(config)?;
    let key = reminder_key(owner_id, &reminder.id);
    let (at, frequency) = (reminder.at, reminder.frequency);
    let anchor = match store.last_fired(&key) {
        Some(last) => previous_occurrence(last + EARLY_FIRE_SLACK, at, tz),
        None => previous_occurrence(engine.clock().now(), at, tz),
    };
    let due = next_occurrence(anchor, at, frequency, tz)?;

    let template = reminder.template();
    let weak = engine.downgrade();
    let store = Arc::clone(store);
    let tz = tz.clone();
    engine.scheduler().register_at(owner_id, frequency, anchor, due, move |event: FireEvent| {
        let Some(engine) = weak.upgrade() else { return };
        engine.notify(template.respawn(event.fired_at));

        let occurrence = previous_occurrence(event.fired_at + EARLY_FIRE_SLACK, at, &tz);
        match next_occurrence(occurrence, at, frequency, &tz) {
            Ok(next) => {
                engine.scheduler().reschedule(&event.handle, occurrence, next);
            }
            Err(e) => warn!("⚠️ Reminder {key} keeps its interval cadence: {e}"),
        }

        store.remember(&key, occurrence);
        if store.path().is_some() {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move {
                if let Err(e) = store.flush_async().await {
                    warn!("⚠️ Could not persist reminder fire for {key}: {e}");
                }
            });
        }
    })
}
