//! Placement engine
//!
//! Moves a finished backup out of the staging area into the backup root.
//!
//! With a retention of 1 the backup root *is* the backup set: entries this
//! tool owns are cleared and the new content is moved in over them. With a
//! larger retention every run gets its own, never-overwritten destination
//! named from the backup-set template, and is recorded in the index.

use std::path::{Path, PathBuf};

use crate::backup::index::{BackupIndexStore, BackupSetEntry};
use crate::backup::naming::unique_destination;
use crate::backup::staging::StagingManager;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::{move_overwrite, move_path, remove_path};

/// Archive name used for a single-archive backup when only one is retained
pub const SINGLE_ARCHIVE_NAME: &str = "NotesBackup.7z";

/// Archive holding the run log when backups are password protected
pub const LOG_ARCHIVE_NAME: &str = "backuplog.7z";

/// Top-level names a backup set is made of
pub const OWNED_ENTRIES: &[&str] = &[
    "profile",
    "notes",
    "templates",
    "all_notebooks.jex",
    "all_notebooks",
];

/// Extension used for archives
pub const ARCHIVE_EXTENSION: &str = "7z";

/// What to place and where
#[derive(Debug, Clone)]
pub struct PlacementRequest<'a> {
    /// Backup root
    pub base: &'a Path,
    /// Staging directory
    pub active: &'a Path,
    pub retention: u32,
    /// Finished single archive, if the run produced one
    pub zip_file: Option<&'a Path>,
    /// Rendered backup-set name
    pub backup_set_name: &'a str,
    /// Run start, epoch milliseconds
    pub started_at: i64,
}

/// Moves finished backups into the backup root
pub struct PlacementEngine<'a> {
    index: BackupIndexStore<'a>,
}

impl<'a> PlacementEngine<'a> {
    pub fn new(index: BackupIndexStore<'a>) -> Self {
        Self { index }
    }

    /// Place the backup, returning its destination
    ///
    /// For a retention of 1 the destination is the backup root itself.
    pub fn place(&self, request: &PlacementRequest<'_>) -> BackupResult<PathBuf> {
        if request.retention <= 1 {
            self.place_in_root(request)
        } else {
            self.place_as_set(request)
        }
    }

    fn place_in_root(&self, request: &PlacementRequest<'_>) -> BackupResult<PathBuf> {
        let base = request.base;
        clear_backup_target(base)?;

        if let Some(zip) = request.zip_file {
            let dest = base.join(SINGLE_ARCHIVE_NAME);
            move_overwrite(zip, &dest).map_err(|e| move_error(zip, &dest, e))?;
            tracing::info!("Moved archive to {}", dest.display());
        } else {
            for entry in StagingManager::entries(request.active)? {
                let Some(name) = entry.file_name() else {
                    continue;
                };
                let dest = base.join(name);
                move_overwrite(&entry, &dest).map_err(|e| move_error(&entry, &dest, e))?;
                tracing::debug!("Moved {} to {}", entry.display(), dest.display());
            }
        }

        StagingManager::remove(request.active)?;
        Ok(base.to_path_buf())
    }

    fn place_as_set(&self, request: &PlacementRequest<'_>) -> BackupResult<PathBuf> {
        let (source, wanted) = match request.zip_file {
            Some(zip) => (
                zip,
                request
                    .base
                    .join(format!("{}.{}", request.backup_set_name, ARCHIVE_EXTENSION)),
            ),
            None => (request.active, request.base.join(request.backup_set_name)),
        };

        let dest = unique_destination(&wanted, request.zip_file.is_some());
        if dest != wanted {
            tracing::info!(
                "{} already exists, using {}",
                wanted.display(),
                dest.display()
            );
        }

        move_path(source, &dest).map_err(|e| move_error(source, &dest, e))?;
        tracing::info!("Backup set placed at {}", dest.display());

        if request.zip_file.is_some() {
            StagingManager::remove(request.active)?;
        }

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| BackupError::placement(format!("Invalid destination {}", dest.display())))?;
        self.index
            .append(BackupSetEntry::new(name, request.started_at))?;

        Ok(dest)
    }
}

/// Remove the previous in-root backup
///
/// Only names this tool writes are touched; anything else in the backup
/// root is left alone.
pub fn clear_backup_target(base: &Path) -> BackupResult<()> {
    let archived: Vec<String> = OWNED_ENTRIES
        .iter()
        .map(|name| format!("{}.{}", name, ARCHIVE_EXTENSION))
        .collect();

    let targets = OWNED_ENTRIES
        .iter()
        .copied()
        .chain(archived.iter().map(String::as_str))
        .chain([SINGLE_ARCHIVE_NAME, LOG_ARCHIVE_NAME]);

    for name in targets {
        let path = base.join(name);
        if path.symlink_metadata().is_err() {
            continue;
        }
        remove_path(&path).map_err(|e| {
            BackupError::placement(format!(
                "Failed to remove previous backup {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!("Removed previous backup entry {}", path.display());
    }

    Ok(())
}

fn move_error(src: &Path, dst: &Path, err: std::io::Error) -> BackupError {
    BackupError::placement(format!(
        "Failed to move {} to {}: {}",
        src.display(),
        dst.display(),
        err
    ))
}
