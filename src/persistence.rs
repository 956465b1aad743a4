//! Snapshot storage: JPEG files plus a JSON metadata index.

use crate::error::PersistenceError;
use crate::CameraId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Stable identifier of a stored snapshot
pub type ArtifactId = String;

const INDEX_FILE: &str = "snapshots.json";

/// Metadata kept for every stored snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub artifact_id: ArtifactId,
    pub camera_id: CameraId,
    pub timestamp: DateTime<Utc>,
    pub file_path: PathBuf,
}

/// Durable storage for encoded snapshots
pub trait Persistence: Send + Sync {
    /// Store `jpeg` and its metadata, returning the new artifact id
    fn save(
        &self,
        jpeg: &[u8],
        camera_id: CameraId,
        timestamp: DateTime<Utc>,
    ) -> Result<ArtifactId, PersistenceError>;

    /// Remove the bytes and the record together
    fn delete(&self, artifact_id: &str) -> Result<(), PersistenceError>;

    fn record(&self, artifact_id: &str) -> Option<SnapshotRecord>;
}

/// Filesystem-backed `Persistence`.
///
/// Every mutation holds the store lock from the file operation through the
/// index rewrite, so readers never observe bytes without a record or the
/// reverse.
pub struct SnapshotStore {
    dir: PathBuf,
    records: Mutex<BTreeMap<ArtifactId, SnapshotRecord>>,
}

impl SnapshotStore {
    /// Open (or create) a store rooted at `dir`, loading any existing index
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, PersistenceError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let index_path = dir.join(INDEX_FILE);
        let mut records = BTreeMap::new();
        match fs::read(&index_path) {
            Ok(bytes) => {
                let stored: Vec<SnapshotRecord> = serde_json::from_slice(&bytes)?;
                for record in stored {
                    if record.file_path.is_file() {
                        records.insert(record.artifact_id.clone(), record);
                    } else {
                        tracing::warn!(
                            artifact_id = %record.artifact_id,
                            "Dropping snapshot record whose file is missing"
                        );
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            dir = %dir.display(),
            snapshots = records.len(),
            "Snapshot store opened"
        );

        Ok(Self {
            dir,
            records: Mutex::new(records),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<SnapshotRecord> {
        let mut records: Vec<SnapshotRecord> = self.lock().values().cloned().collect();
        records.sort_by_key(|record| record.timestamp);
        records
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ArtifactId, SnapshotRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rewrite the index via a temp file and rename
    fn write_index(
        &self,
        records: &BTreeMap<ArtifactId, SnapshotRecord>,
    ) -> Result<(), PersistenceError> {
        let list: Vec<&SnapshotRecord> = records.values().collect();
        let json = serde_json::to_vec_pretty(&list)?;
        let tmp = self.dir.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.dir.join(INDEX_FILE))?;
        Ok(())
    }

    fn artifact_name(
        records: &BTreeMap<ArtifactId, SnapshotRecord>,
        dir: &Path,
        camera_id: CameraId,
        timestamp: DateTime<Utc>,
    ) -> ArtifactId {
        let stem = format!(
            "camera_{}_{}",
            camera_id,
            timestamp.format("%Y%m%d_%H%M%S_%6f")
        );
        let mut name = format!("{stem}.jpg");
        let mut n = 1;
        while records.contains_key(&name) || dir.join(&name).exists() {
            name = format!("{stem}_{n}.jpg");
            n += 1;
        }
        name
    }
}

impl Persistence for SnapshotStore {
    fn save(
        &self,
        jpeg: &[u8],
        camera_id: CameraId,
        timestamp: DateTime<Utc>,
    ) -> Result<ArtifactId, PersistenceError> {
        let mut records = self.lock();

        let artifact_id = Self::artifact_name(&records, &self.dir, camera_id, timestamp);
        let file_path = self.dir.join(&artifact_id);
        fs::write(&file_path, jpeg)?;

        records.insert(
            artifact_id.clone(),
            SnapshotRecord {
                artifact_id: artifact_id.clone(),
                camera_id,
                timestamp,
                file_path: file_path.clone(),
            },
        );

        if let Err(e) = self.write_index(&records) {
            records.remove(&artifact_id);
            if let Err(cleanup) = fs::remove_file(&file_path) {
                tracing::warn!(error = %cleanup, "Failed to remove orphaned snapshot file");
            }
            return Err(e);
        }

        tracing::debug!(camera_id, artifact_id = %artifact_id, bytes = jpeg.len(), "Snapshot saved");
        Ok(artifact_id)
    }

    fn delete(&self, artifact_id: &str) -> Result<(), PersistenceError> {
        let mut records = self.lock();

        let Some(record) = records.get(artifact_id) else {
            return Err(PersistenceError::NotFound(artifact_id.to_string()));
        };

        match fs::remove_file(&record.file_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(artifact_id, "Snapshot file already gone, removing record");
            }
            Err(e) => return Err(e.into()),
        }

        records.remove(artifact_id);
        // The file is already gone; a stale index entry is dropped on the next open
        if let Err(e) = self.write_index(&records) {
            tracing::warn!(artifact_id, error = %e, "Failed to rewrite snapshot index after delete");
        }

        tracing::debug!(artifact_id, "Snapshot deleted");
        Ok(())
    }

    fn record(&self, artifact_id: &str) -> Option<SnapshotRecord> {
        self.lock().get(artifact_id).cloned()
    }
}
