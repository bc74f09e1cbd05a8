//! Unified error types for Stride.

use thiserror::Error;

/// Result type alias using StrideError.
pub type Result<T> = std::result::Result<T, StrideError>;

#[derive(Error, Debug)]
pub enum StrideError {
    // Channel errors
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Channel not configured: {0}")]
    ChannelNotConfigured(String),

    // Scheduling errors
    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Schedule error: {0}")]
    Schedule(String),

    // Backup errors
    #[error("Backup failed: {0}")]
    Backup(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // State store errors
    #[error("State store error: {0}")]
    Store(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl StrideError {
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schedule(msg: impl Into<String>) -> Self {
        Self::Schedule(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
