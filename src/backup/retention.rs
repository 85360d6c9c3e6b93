//! Retention pruning
//!
//! Keeps the newest `retention` backup sets listed in the index and deletes
//! the rest from disk. Entries whose backup set has disappeared are dropped
//! from the index first.

use std::path::Path;

use crate::backup::index::BackupIndexStore;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::remove_path;

/// Deletes backup sets beyond the retention count
pub struct RetentionPruner<'a> {
    index: BackupIndexStore<'a>,
}

impl<'a> RetentionPruner<'a> {
    pub fn new(index: BackupIndexStore<'a>) -> Self {
        Self { index }
    }

    /// Prune `base` down to `retention` backup sets
    ///
    /// Returns the names of the deleted sets. The index is saved after every
    /// deletion, so an error part way through leaves it matching the disk.
    pub fn prune(&self, base: &Path, retention: u32) -> BackupResult<Vec<String>> {
        let mut entries = self.index.load()?;

        let before = entries.len();
        entries.retain(|entry| {
            if !entry.has_plain_name() {
                tracing::info!(
                    "Index entry '{}' is not a backup set name, forgetting it",
                    entry.name
                );
                return false;
            }
            let exists = entry.exists_in(base);
            if !exists {
                tracing::info!("Backup set {} no longer exists, forgetting it", entry.name);
            }
            exists
        });
        if entries.len() != before {
            tracing::debug!("Dropped {} stale index entries", before - entries.len());
        }
        self.index.save(&entries)?;

        let keep = retention.max(1) as usize;
        if entries.len() <= keep {
            return Ok(Vec::new());
        }

        entries.sort_by(|a, b| b.date.cmp(&a.date));

        let mut deleted = Vec::new();
        while entries.len() > keep {
            let entry = entries.remove(keep);
            let path = base.join(&entry.name);
            tracing::info!("Removing old backup set {}", path.display());

            match remove_path(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(BackupError::retention(format!(
                        "Failed to remove old backup set {}: {}",
                        path.display(),
                        e
                    )))
                }
            }

            self.index.save(&entries)?;
            deleted.push(entry.name);
        }

        Ok(deleted)
    }
}
