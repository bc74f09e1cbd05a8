//! Settings read by the engine at dispatch time.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use crate::config::StrideConfig;
use crate::types::QuietHours;

/// Channel enablement and quiet hours as of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliverySettings {
    pub quiet_hours: QuietHours,
    pub enabled: BTreeMap<String, bool>,
}

impl DeliverySettings {
    pub fn from_config(config: &StrideConfig) -> Self {
        Self {
            quiet_hours: config.quiet_hours,
            enabled: config.channels.enabled_map(),
        }
    }

    /// Channels without an entry are enabled; only an explicit `false` disables.
    pub fn is_enabled(&self, channel_id: &str) -> bool {
        self.enabled.get(channel_id).copied().unwrap_or(true)
    }
}

/// Supplies [`DeliverySettings`]. Called on every dispatch, never cached by the engine.
pub trait SettingsSource: Send + Sync {
    fn snapshot(&self) -> DeliverySettings;

    /// `true` if [`snapshot`](Self::snapshot) does blocking I/O. The engine
    /// reads such sources on the blocking pool.
    fn is_blocking(&self) -> bool {
        false
    }
}

/// In-memory settings that can be toggled at runtime.
#[derive(Debug, Default)]
pub struct StaticSettings {
    inner: RwLock<DeliverySettings>,
}

impl StaticSettings {
    pub fn new(settings: DeliverySettings) -> Self {
        Self { inner: RwLock::new(settings) }
    }

    pub fn set_enabled(&self, channel_id: impl Into<String>, enabled: bool) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.enabled.insert(channel_id.into(), enabled);
    }

    pub fn set_quiet_hours(&self, quiet_hours: QuietHours) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.quiet_hours = quiet_hours;
    }
}

impl SettingsSource for StaticSettings {
    fn snapshot(&self) -> DeliverySettings {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Re-reads the config file on every snapshot so edits apply to the next
/// notification. A broken file keeps the last good settings.
pub struct ConfigFileSettings {
    path: PathBuf,
    last_good: Mutex<DeliverySettings>,
}

impl ConfigFileSettings {
    pub fn new(path: PathBuf, initial: &StrideConfig) -> Self {
        Self {
            path,
            last_good: Mutex::new(DeliverySettings::from_config(initial)),
        }
    }
}

impl SettingsSource for ConfigFileSettings {
    fn snapshot(&self) -> DeliverySettings {
        let mut last_good = self.last_good.lock().unwrap_or_else(|e| e.into_inner());
        match StrideConfig::load_from(&self.path) {
            Ok(config) => {
                *last_good = DeliverySettings::from_config(&config);
            }
            Err(e) => {
                tracing::warn!("Settings reload from {} failed, keeping previous: {e}", self.path.display());
            }
        }
        last_good.clone()
    }

    fn is_blocking(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_channel_enabled() {
        let settings = DeliverySettings::default();
        assert!(settings.is_enabled("push"));
    }

    #[test]
    fn test_static_toggle() {
        let source = StaticSettings::default();
        source.set_enabled("email", false);
        assert!(!source.snapshot().is_enabled("email"));
        source.set_enabled("email", true);
        assert!(source.snapshot().is_enabled("email"));
    }

    #[test]
    fn test_file_settings_follow_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = StrideConfig::default();
        config.channels.webhook.enabled = true;
        config.save_to(&path).unwrap();

        let source = ConfigFileSettings::new(path.clone(), &config);
        assert!(source.is_blocking());
        assert!(!StaticSettings::default().is_blocking());
        assert!(source.snapshot().is_enabled("webhook"));

        config.channels.webhook.enabled = false;
        config.save_to(&path).unwrap();
        assert!(!source.snapshot().is_enabled("webhook"));

        std::fs::write(&path, "this is [not toml").unwrap();
        assert!(!source.snapshot().is_enabled("webhook"));
    }
}
