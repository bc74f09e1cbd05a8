//! Configuration loaded from `~/.stride/config.toml`.
//!
//! Every field has a default so a missing or partial file still yields a
//! working engine. Channel credentials live here too; the settings source
//! re-reads this file at dispatch time.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, StrideError};
use crate::types::{Priority, QuietHours};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrideConfig {
    /// Owner the CLI registers reminders and backups for.
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub quiet_hours: QuietHours,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub reminders: Vec<ReminderConfig>,
    #[serde(default)]
    pub backup: BackupConfig,
}

fn default_owner() -> String { "default".into() }
fn default_true() -> bool { true }

impl Default for StrideConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            queue: QueueConfig::default(),
            quiet_hours: QuietHours::default(),
            channels: ChannelsConfig::default(),
            reminders: vec![],
            backup: BackupConfig::default(),
        }
    }
}

/// Where the UI should stack toasts. The engine only carries it through.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Position {
    #[default]
    TopRight,
    TopLeft,
    TopCenter,
    BottomRight,
    BottomLeft,
    BottomCenter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default)]
    pub default_priority: Priority,
    #[serde(default)]
    pub position: Position,
}

fn default_max_concurrent() -> usize { 3 }
fn default_timeout_ms() -> u64 { 5000 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_timeout_ms: default_timeout_ms(),
            default_priority: Priority::default(),
            position: Position::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

impl ChannelsConfig {
    /// Enablement flag per channel id.
    pub fn enabled_map(&self) -> std::collections::BTreeMap<String, bool> {
        [
            ("webhook".to_string(), self.webhook.enabled),
            ("discord".to_string(), self.discord.enabled),
            ("email".to_string(), self.email.enabled),
        ]
        .into_iter()
        .collect()
    }
}

/// Outbound webhook channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,
    /// URL to POST notifications to.
    #[serde(default)]
    pub url: Option<String>,
    /// Shared secret for the `X-Stride-Signature` HMAC header.
    #[serde(default)]
    pub secret: Option<String>,
}

/// Discord incoming-webhook channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// SMTP email channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

fn default_smtp_port() -> u16 { 587 }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            to: String::new(),
        }
    }
}

/// A recurring reminder, e.g. "log your meals" every day at 20:00.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    /// Local time of day, `HH:MM`.
    pub at: String,
    /// `daily`, `weekly` or `monthly`. Validated when the reminder is registered.
    #[serde(default = "default_reminder_frequency")]
    pub frequency: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_reminder_frequency() -> String { "daily".into() }

/// Periodic backup of the user's data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_backup_frequency")]
    pub frequency: String,
    /// File to back up. `~` is expanded.
    #[serde(default)]
    pub source: String,
    /// Directory receiving the copies. `~` is expanded.
    #[serde(default = "default_backup_dir")]
    pub destination: String,
    /// Number of newest backups to keep.
    #[serde(default = "default_keep")]
    pub keep: usize,
    #[serde(default)]
    pub channels: Vec<String>,
}

fn default_backup_frequency() -> String { "weekly".into() }
fn default_backup_dir() -> String { "~/.stride/backups".into() }
fn default_keep() -> usize { 5 }

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: default_backup_frequency(),
            source: String::new(),
            destination: default_backup_dir(),
            keep: default_keep(),
            channels: vec![],
        }
    }
}

impl StrideConfig {
    /// `~/.stride`, or `./.stride` when no home directory is known.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".stride")
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load from the default path, falling back to defaults if the file is absent.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StrideError::ConfigNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StrideError::config(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.max_concurrent == 0 {
            return Err(StrideError::config("queue.max_concurrent must be at least 1"));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| StrideError::config(format!("Serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    match shellexpand::full(p) {
        Ok(expanded) => PathBuf::from(expanded.to_string()),
        Err(_) => PathBuf::from(shellexpand::tilde(p).to_string()),
    }
}
