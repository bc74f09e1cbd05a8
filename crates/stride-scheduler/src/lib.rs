//! # Stride Scheduler
//!
//! In-app notification lifecycle plus the recurring triggers and external
//! delivery that feed it.
//!
//! ## Architecture
//! ```text
//! NotifyEngine
//!   ├── NotificationQueue (max N on screen, priority-ordered pending)
//!   │     └── LifecycleTimer per active item (pause on hover, no drift)
//!   ├── RecurringScheduler (daily / weekly / monthly, catch-up on start)
//!   │     ├── reminders: "20:00 log your meals"
//!   │     └── backup: copy data file, prune, report
//!   └── ChannelDispatcher (concurrent fan-out, per-channel isolation)
//!         ├── Webhook
//!         ├── Discord
//!         └── Email
//! ```

pub mod backup;
pub mod dispatch;
pub mod engine;
pub mod queue;
pub mod recurring;
pub mod reminders;
pub mod store;
pub mod timer;

pub use dispatch::{ChannelDispatcher, DispatchResult};
pub use engine::{DispatchOutcome, EngineBuilder, NotifyEngine, NotifyReceipt, WeakNotifyEngine};
pub use queue::{NotificationQueue, Placement, QueueSnapshot, QueueState};
pub use recurring::{FireEvent, RecurringScheduler, Schedule, ScheduleHandle};
pub use store::StateStore;
pub use timer::LifecycleTimer;
