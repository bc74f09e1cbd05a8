//! # Stride Core
//! Shared types, configuration, clock and collaborator traits for the
//! Stride notification engine.

pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::StrideConfig;
pub use error::{Result, StrideError};
