//! Staging area ("active backup job")
//!
//! Exporters write into a scratch directory that exists only for the length
//! of one run. It is handed out empty: anything left behind by an earlier,
//! failed run is purged first.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BackupError, BackupResult};

/// Name of the staging directory under its base path
pub const ACTIVE_BACKUP_JOB: &str = "activeBackupJob";

/// Creates and clears the staging directory
pub struct StagingManager;

impl StagingManager {
    /// Ensure `<base>/<subfolder>` exists and is empty, returning its path
    pub fn ensure_empty(base: &Path, subfolder: &str) -> BackupResult<PathBuf> {
        let path = base.join(subfolder);

        if path.symlink_metadata().is_ok() {
            tracing::debug!("Clearing leftover staging directory {}", path.display());
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| {
                BackupError::staging(format!("Failed to clear {}: {}", path.display(), e))
            })?;
        }

        fs::create_dir_all(&path).map_err(|e| {
            BackupError::staging(format!("Failed to create {}: {}", path.display(), e))
        })?;

        Ok(path)
    }

    /// Remove the staging directory after a successful run
    pub fn remove(path: &Path) -> BackupResult<()> {
        if !path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(path).map_err(|e| {
            BackupError::staging(format!("Failed to remove {}: {}", path.display(), e))
        })
    }

    /// Top-level entries of the staging directory, sorted by name
    pub fn entries(path: &Path) -> BackupResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(path)
            .map_err(|e| {
                BackupError::staging(format!("Failed to read {}: {}", path.display(), e))
            })?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();
        Ok(entries)
    }
}
