//! Periodic copies of the user's data file.
//!
//! Each run copies `source` into `destination/<owner>-<timestamp>.bak` and
//! prunes older copies. Only successful runs are persisted, so a failed
//! backup is retried as overdue on the next start.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use stride_core::config::{BackupConfig, expand_path};
use stride_core::error::{Result, StrideError};
use stride_core::types::{Frequency, Notification, NotificationKind, Priority};

use crate::engine::NotifyEngine;
use crate::recurring::{FireEvent, ScheduleHandle};
use crate::store::{StateStore, backup_key};

/// UTC timestamp embedded in backup file names.
const BACKUP_STAMP: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Clone)]
pub struct BackupPlan {
    pub frequency: Frequency,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub keep: usize,
    pub channels: Vec<String>,
}

impl BackupPlan {
    pub fn from_config(config: &BackupConfig) -> Result<Self> {
        if config.source.trim().is_empty() {
            return Err(StrideError::config("backup.source is not set"));
        }
        Ok(Self {
            frequency: config.frequency.parse()?,
            source: expand_path(&config.source),
            destination: expand_path(&config.destination),
            keep: config.keep.max(1),
            channels: config.channels.clone(),
        })
    }
}

/// Copy the source file and prune old copies. Returns the new backup path.
pub fn run_backup(plan: &BackupPlan, owner_id: &str, at: DateTime<Utc>) -> Result<PathBuf> {
    if !plan.source.is_file() {
        return Err(StrideError::backup(format!(
            "source {} does not exist",
            plan.source.display()
        )));
    }
    std::fs::create_dir_all(&plan.destination)?;

    let name = format!("{owner_id}-{}.bak", at.format(BACKUP_STAMP));
    let target = plan.destination.join(name);
    std::fs::copy(&plan.source, &target)?;
    debug!("Copied {} -> {}", plan.source.display(), target.display());

    let removed = prune(&plan.destination, owner_id, plan.keep)?;
    if !removed.is_empty() {
        debug!("Pruned {} old backup(s)", removed.len());
    }
    Ok(target)
}

/// Timestamp of a backup file name written for exactly `owner_id`.
fn backup_time(file_name: &str, owner_id: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(owner_id)?
        .strip_prefix('-')?
        .strip_suffix(".bak")?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_STAMP).ok()
}

/// Delete all but the `keep` newest backups of `owner_id` in `dir`.
/// Files that are not `<owner_id>-<timestamp>.bak` are never touched.
pub fn prune(dir: &Path, owner_id: &str, keep: usize) -> Result<Vec<PathBuf>> {
    let mut backups: Vec<(NaiveDateTime, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter_map(|path| {
            let taken = backup_time(path.file_name()?.to_str()?, owner_id)?;
            Some((taken, path))
        })
        .collect();
    backups.sort_by(|a, b| b.0.cmp(&a.0));

    let stale: Vec<PathBuf> = backups.into_iter().skip(keep).map(|(_, path)| path).collect();
    for path in &stale {
        std::fs::remove_file(path)?;
    }
    Ok(stale)
}

/// Run one backup off the async threads, persist success and notify.
pub async fn backup_and_report(
    engine: &NotifyEngine,
    store: &Arc<StateStore>,
    owner_id: &str,
    plan: &BackupPlan,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    let job_plan = plan.clone();
    let job_owner = owner_id.to_string();
    let outcome = tokio::task::spawn_blocking(move || run_backup(&job_plan, &job_owner, at))
        .await
        .map_err(|e| StrideError::backup(format!("backup task failed: {e}")))
        .and_then(|r| r);

    match &outcome {
        Ok(path) => {
            info!("💾 Backup for {owner_id} written to {}", path.display());
            if let Err(e) = Arc::clone(store).record_async(backup_key(owner_id), at).await {
                warn!("⚠️ Could not persist backup time for {owner_id}: {e}");
            }
            engine.notify(
                Notification::new(
                    NotificationKind::Backup,
                    "Backup complete",
                    format!("Saved to {}", path.display()),
                )
                .with_priority(Priority::Low)
                .with_channels(plan.channels.iter().cloned()),
            );
        }
        Err(e) => {
            warn!("⚠️ Backup for {owner_id} failed: {e}");
            engine.notify(
                Notification::new(NotificationKind::Backup, "Backup failed", e.to_string())
                    .with_priority(Priority::High)
                    .persistent()
                    .with_channels(plan.channels.iter().cloned()),
            );
        }
    }
    outcome
}

/// Register the owner's backup plan. With no successful backup on record
/// the first run happens immediately.
pub fn schedule_backups(
    engine: &NotifyEngine,
    store: &Arc<StateStore>,
    owner_id: &str,
    plan: BackupPlan,
) -> Result<ScheduleHandle> {
    let last = store
        .last_fired(&backup_key(owner_id))
        .unwrap_or_default();
    let frequency = plan.frequency;
    let weak = engine.downgrade();
    let store = Arc::clone(store);
    let plan = Arc::new(plan);

    let handle = engine.scheduler().register(owner_id, frequency, last, move |event: FireEvent| {
        let Some(engine) = weak.upgrade() else { return };
        let store = Arc::clone(&store);
        let plan = Arc::clone(&plan);
        tokio::spawn(async move {
            let owner_id = event.handle.owner_id();
            // Outcome is already logged and notified.
            if let Err(e) = backup_and_report(&engine, &store, owner_id, &plan, event.fired_at).await {
                debug!("Scheduled backup for {owner_id} ended with error: {e}");
            }
        });
    })?;
    info!("💾 {frequency} backups scheduled for {owner_id}");
    Ok(handle)
}
