//! Last-fire bookkeeping for reminders and backups.
//!
//! Stored as a small JSON file so catch-up after downtime survives a
//! restart. Writes go to a temp file first and are renamed into place.
//! Async callers flush on the blocking pool via [`StateStore::record_async`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use stride_core::config::StrideConfig;
use stride_core::error::{Result, StrideError};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    last_fired: BTreeMap<String, DateTime<Utc>>,
}

/// JSON-backed map from schedule key to last successful fire time.
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    state: Mutex<StateFile>,
    /// Serializes flushes so the file never goes back to an older state.
    write_lock: Mutex<()>,
}

impl StateStore {
    /// `~/.stride/state.json`
    pub fn default_path() -> PathBuf {
        StrideConfig::home_dir().join("state.json")
    }

    /// Open the store at `path`. A missing file is an empty store; a
    /// corrupt one is an error so it is never silently overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                StrideError::store(format!("Corrupt state file {}: {e}", path.display()))
            })?
        } else {
            StateFile::default()
        };
        tracing::debug!("State store at {}", path.display());
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
            write_lock: Mutex::new(()),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StateFile::default()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, StateFile> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn last_fired(&self, key: &str) -> Option<DateTime<Utc>> {
        self.lock().last_fired.get(key).copied()
    }

    /// Update the in-memory entry without touching disk.
    pub fn remember(&self, key: &str, at: DateTime<Utc>) {
        self.lock().last_fired.insert(key.to_string(), at);
    }

    /// Write the current state to disk. Blocking.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _writing = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let state = self.lock().clone();
        write_atomic(path, &state)
    }

    /// Record a fire and flush to disk. Blocking.
    pub fn record(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.remember(key, at);
        self.flush()
    }

    /// Record a fire now and flush on the blocking pool.
    pub async fn record_async(self: Arc<Self>, key: String, at: DateTime<Utc>) -> Result<()> {
        self.remember(&key, at);
        self.flush_async().await
    }

    /// [`flush`](Self::flush) on the blocking pool.
    pub async fn flush_async(self: Arc<Self>) -> Result<()> {
        if self.path.is_none() {
            return Ok(());
        }
        tokio::task::spawn_blocking(move || self.flush())
            .await
            .map_err(|e| StrideError::store(format!("state write task failed: {e}")))?
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().last_fired.keys().cloned().collect()
    }
}

fn write_atomic(path: &Path, state: &StateFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    let tmp_path = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Store key for a configured reminder.
pub fn reminder_key(owner_id: &str, reminder_id: &str) -> String {
    format!("reminder:{owner_id}:{reminder_id}")
}

/// Store key for an owner's backup plan.
pub fn backup_key(owner_id: &str) -> String {
    format!("backup:{owner_id}")
}
