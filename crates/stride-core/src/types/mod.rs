//! Core data types.

pub mod notification;
pub mod quiet_hours;
pub mod schedule;

pub use notification::{
    ActionHandler, Notification, NotificationAction, NotificationId, NotificationKind, Priority,
};
pub use quiet_hours::QuietHours;
pub use schedule::{Frequency, parse_hhmm};
