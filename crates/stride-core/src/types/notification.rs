//! Notification data model shared by producers, the queue and channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StrideError;

/// Notification identifier. Snoozed notifications come back under a new id.
pub type NotificationId = uuid::Uuid;

/// Display and admission priority. Ordering is `Low < Medium < High < Urgent`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = StrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" | "critical" => Ok(Priority::Urgent),
            other => Err(StrideError::config(format!("Unknown priority: {other}"))),
        }
    }
}

/// What produced the notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Goal,
    Habit,
    Achievement,
    Reminder,
    Backup,
    #[default]
    System,
    Custom(String),
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Goal => write!(f, "goal"),
            NotificationKind::Habit => write!(f, "habit"),
            NotificationKind::Achievement => write!(f, "achievement"),
            NotificationKind::Reminder => write!(f, "reminder"),
            NotificationKind::Backup => write!(f, "backup"),
            NotificationKind::System => write!(f, "system"),
            NotificationKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Callback run when the user invokes an action button.
pub type ActionHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// A button attached to a notification.
#[derive(Clone, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(skip)]
    pub on_invoke: Option<ActionHandler>,
}

impl NotificationAction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            is_primary: false,
            on_invoke: None,
        }
    }

    pub fn primary(label: impl Into<String>) -> Self {
        Self {
            is_primary: true,
            ..Self::new(label)
        }
    }

    pub fn on_invoke(mut self, handler: impl Fn(&Notification) + Send + Sync + 'static) -> Self {
        self.on_invoke = Some(Arc::new(handler));
        self
    }
}

impl std::fmt::Debug for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationAction")
            .field("label", &self.label)
            .field("is_primary", &self.is_primary)
            .field("on_invoke", &self.on_invoke.is_some())
            .finish()
    }
}

/// A single notification. Immutable once handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Display lifetime in milliseconds. `Some(0)` never expires,
    /// `None` takes the configured default when passed through the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub channel_targets: BTreeSet<String>,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Notification {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            kind,
            title: title.into(),
            message: message.into(),
            priority: Priority::default(),
            created_at: Utc::now(),
            timeout_ms: None,
            persistent: false,
            actions: vec![],
            channel_targets: BTreeSet::new(),
            payload: serde_json::Map::new(),
        }
    }

    /// Stamp the creation time, e.g. from an injected clock.
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Mark as persistent: it stays until dismissed and never gets a timer.
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_targets.insert(channel_id.into());
        self
    }

    pub fn with_channels<I, S>(mut self, channel_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channel_targets.extend(channel_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// How long the notification stays on screen, or `None` if it never
    /// expires on its own.
    pub fn lifetime(&self) -> Option<Duration> {
        if self.persistent {
            return None;
        }
        match self.timeout_ms {
            Some(ms) if ms > 0 => Some(Duration::from_millis(ms)),
            _ => None,
        }
    }

    pub fn is_channel_backed(&self) -> bool {
        !self.channel_targets.is_empty()
    }

    /// Copy with a fresh id created at `at`, used when a snooze elapses
    /// or a recurring trigger fires.
    pub fn respawn(&self, at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            created_at: at,
            ..self.clone()
        }
    }
}
