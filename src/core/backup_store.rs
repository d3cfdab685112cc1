//! Backup store for namespace snapshots
//!
//! Holds the latest snapshot pushed by the control node and persists it to
//! a local JSON file so the backup service itself survives a restart.

use crate::core::snapshot::Snapshot;
use crate::error::Result;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct BackupStore {
    location: PathBuf,
    current: RwLock<Option<Snapshot>>,
}

impl BackupStore {
    /// Open the backup file at `location`, loading it if present
    pub fn open<P: AsRef<Path>>(location: P) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        if let Some(parent) = location.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let current = if location.is_file() {
            let text = std::fs::read_to_string(&location)?;
            let snapshot = Snapshot::from_json(&text)?;
            info!(
                location = %location.display(),
                entries = snapshot.len(),
                "loaded snapshot from disk"
            );
            Some(snapshot)
        } else {
            info!(location = %location.display(), "no backup file found, starting empty");
            None
        };

        Ok(BackupStore {
            location,
            current: RwLock::new(current),
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Latest snapshot, if one was ever stored
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.current.read().clone()
    }

    /// Replace the stored snapshot; the file is written before memory is
    /// updated
    pub fn update(&self, snapshot: Snapshot) -> Result<()> {
        let mut current = self.current.write();
        self.persist(&snapshot)?;
        info!(entries = snapshot.len(), taken_at = snapshot.taken_at, "snapshot updated");
        *current = Some(snapshot);
        Ok(())
    }

    /// Write the in-memory snapshot to disk again
    pub fn flush(&self) -> Result<()> {
        let current = self.current.read();
        if let Some(snapshot) = current.as_ref() {
            self.persist(snapshot)?;
            info!(location = %self.location.display(), "snapshot flushed to disk");
        }
        Ok(())
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let mut tmp = self.location.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, snapshot.to_json()?)?;
        std::fs::rename(&tmp, &self.location)?;
        Ok(())
    }
}
