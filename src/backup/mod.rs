//! Point-in-time snapshots of the store.
//!
//! Snapshots go through `SQLite`'s online backup API into `<name>.tmp` and are renamed
//! into place once complete, so a reader of the backup directory never sees a torn file.

mod naming;
mod retention;
mod scheduler;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::events::{EventBus, EventPayload};
use crate::sqlite::SqliteConnection;

pub(crate) use scheduler::BackupTimer;

/// How a snapshot's filename is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupName {
    /// `backup_<unix millis>.db`
    Timestamp,
    /// `backup_<YYYY-MM-DD>_<HH-MM-SS>.db`, local time.
    #[default]
    DateTime,
    /// `backup_<NNN>.db`, one past the highest existing number.
    Increment,
    /// Caller-chosen file name; `.db` is appended when missing.
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

pub(crate) async fn create_backup(
    conn: &SqliteConnection,
    dir: &Path,
    name: &BackupName,
    max_backups: usize,
    events: &EventBus,
) -> Result<BackupRecord, StoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StoreError::backup(format!("create {}", dir.display()), e))?;

    let created_at = Utc::now();
    let filename = {
        let dir = dir.to_path_buf();
        let name = name.clone();
        blocking(move || naming::resolve_filename(&dir, &name, created_at)).await?
    };
    let path = dir.join(&filename);
    let staging = dir.join(format!("{filename}.tmp"));

    if let Err(err) = conn.backup_to(staging.clone()).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(err);
    }
    tokio::fs::rename(&staging, &path)
        .await
        .map_err(|e| StoreError::backup(format!("move {} into place", staging.display()), e))?;
    let size_bytes = tokio::fs::metadata(&path)
        .await
        .map_err(|e| StoreError::backup(format!("stat {}", path.display()), e))?
        .len();

    let pruned = apply_retention(dir, max_backups, events).await;
    events.emit(EventPayload::Backup {
        filename: filename.clone(),
        size_bytes,
        pruned,
    });

    Ok(BackupRecord {
        filename,
        path,
        size_bytes,
        created_at,
    })
}

/// Run directory scans off the async runtime.
async fn blocking<T, F>(work: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::backup("directory scan task", e))?
}

/// Prune old backups; failures become error events. Returns how many files were removed.
async fn apply_retention(dir: &Path, max_backups: usize, events: &EventBus) -> usize {
    let scan_dir = dir.to_path_buf();
    let scanned = blocking(move || {
        retention::prune(&scan_dir, max_backups)
            .map_err(|e| StoreError::backup(format!("scan {}", scan_dir.display()), e))
    })
    .await;
    match scanned {
        Ok(outcome) => {
            for (path, err) in &outcome.failed {
                events.error(
                    "backup_cleanup",
                    &StoreError::backup(format!("remove {}", path.display()), err),
                );
            }
            outcome.removed.len()
        }
        Err(err) => {
            events.error("backup_cleanup", &err);
            0
        }
    }
}
