//! File-backed snapshot history with a retention ceiling
//!
//! Each snapshot lives in its own JSON file named after a sortable numeric id
//! (creation time in milliseconds, zero padded). Ids are strictly increasing
//! even when two snapshots are saved within the same millisecond.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CollectorResult;
use crate::models::AnalysisSnapshot;

const FILE_PREFIX: &str = "snapshot-";
const FILE_SUFFIX: &str = ".json";

/// How many snapshots to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_history_items: usize,
}

/// Location of one stored snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub id: u64,
    pub path: PathBuf,
}

pub struct SnapshotStore {
    dir: PathBuf,
    policy: RetentionPolicy,
    // Serializes save+cleanup and remembers the last id handed out
    last_id: Mutex<Option<u64>>,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, policy: RetentionPolicy) -> Self {
        Self {
            dir: dir.into(),
            policy,
            last_id: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    fn file_name(id: u64) -> String {
        format!("{}{:020}{}", FILE_PREFIX, id, FILE_SUFFIX)
    }

    fn parse_id(file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_SUFFIX)?
            .parse()
            .ok()
    }

    /// Write a new snapshot, then enforce the retention ceiling
    pub async fn save(&self, snapshot: &AnalysisSnapshot) -> CollectorResult<SnapshotEntry> {
        let mut last_id = self.last_id.lock().await;

        fs::create_dir_all(&self.dir).await?;

        let last = match *last_id {
            Some(id) => Some(id),
            None => self.list().await?.last().map(|e| e.id),
        };
        let now = u64::try_from(snapshot.timestamp.timestamp_millis()).unwrap_or(0);
        let id = match last {
            Some(prev) if prev >= now => prev + 1,
            _ => now,
        };

        let path = self.dir.join(Self::file_name(id));
        let tmp_path = self.dir.join(format!(".{}.tmp", Self::file_name(id)));
        let body = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&tmp_path, body).await?;
        fs::rename(&tmp_path, &path).await?;
        *last_id = Some(id);
        debug!("Saved snapshot {}", path.display());

        let removed = self.cleanup_locked().await?;
        if removed > 0 {
            info!("Retention cleanup removed {} old snapshots", removed);
        }

        Ok(SnapshotEntry { id, path })
    }

    /// All retained entries, oldest first
    pub async fn list(&self) -> CollectorResult<Vec<SnapshotEntry>> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name();
            if let Some(id) = file_name.to_str().and_then(Self::parse_id) {
                entries.push(SnapshotEntry { id, path: entry.path() });
            }
        }

        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    /// Delete the oldest entries beyond `max_history_items`
    ///
    /// Returns how many entries were removed; a second call without new
    /// writes removes nothing.
    pub async fn cleanup(&self) -> CollectorResult<usize> {
        let _guard = self.last_id.lock().await;
        self.cleanup_locked().await
    }

    async fn cleanup_locked(&self) -> CollectorResult<usize> {
        let entries = self.list().await?;
        if entries.len() <= self.policy.max_history_items {
            return Ok(0);
        }

        let excess = entries.len() - self.policy.max_history_items;
        let mut removed = 0;
        for entry in entries.iter().take(excess) {
            match fs::remove_file(&entry.path).await {
                Ok(()) => removed += 1,
                // Someone else already removed it; the ceiling still holds
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Snapshot {} vanished during cleanup", entry.path.display());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }

    /// The most recent snapshot, if any
    pub async fn get_latest(&self) -> CollectorResult<Option<AnalysisSnapshot>> {
        let Some(entry) = self.list().await?.pop() else {
            return Ok(None);
        };

        let body = fs::read(&entry.path).await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }
}
