//! Archive assembler
//!
//! Turns the staging area into its archived form according to the archive
//! mode: untouched, one archive per top-level item, or one archive holding
//! everything.

use std::path::{Path, PathBuf};

use crate::backup::archive::{AddOption, Archiver};
use crate::backup::placement::ARCHIVE_EXTENSION;
use crate::backup::staging::StagingManager;
use crate::config::settings::ArchiveMode;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::remove_path;

/// Name of the single archive while it is being built in the backup root
pub const TEMP_ARCHIVE_NAME: &str = "newBackupSet.7z";

/// Archives the staging area
pub struct ArchiveAssembler<'a> {
    archiver: &'a dyn Archiver,
    password: Option<&'a str>,
    compression_level: u8,
}

impl<'a> ArchiveAssembler<'a> {
    pub fn new(archiver: &'a dyn Archiver, password: Option<&'a str>, compression_level: u8) -> Self {
        Self {
            archiver,
            password,
            compression_level,
        }
    }

    /// Archive `active` according to `mode`
    ///
    /// Returns the finished single archive in [`ArchiveMode::SingleArchive`]
    /// mode, `None` otherwise. On failure the staging area is left as it was
    /// for inspection.
    pub async fn assemble(
        &self,
        mode: ArchiveMode,
        base: &Path,
        active: &Path,
    ) -> BackupResult<Option<PathBuf>> {
        match mode {
            ArchiveMode::None => Ok(None),
            ArchiveMode::PerItem => {
                self.archive_each(active).await?;
                Ok(None)
            }
            ArchiveMode::SingleArchive => self.archive_all(base, active).await.map(Some),
        }
    }

    async fn archive_each(&self, active: &Path) -> BackupResult<()> {
        for entry in StagingManager::entries(active)? {
            let Some(name) = entry.file_name() else {
                continue;
            };
            let archive = active.join(format!("{}.{}", name.to_string_lossy(), ARCHIVE_EXTENSION));
            tracing::info!("Archiving {}", entry.display());

            self.archiver
                .add(&archive, &entry, self.password, &self.options())
                .await?
                .map_err(|failure| {
                    BackupError::archive(format!(
                        "Failed to archive {}: {}",
                        entry.display(),
                        failure
                    ))
                })?;

            remove_path(&entry).map_err(|e| {
                BackupError::archive(format!(
                    "Failed to remove {} after archiving: {}",
                    entry.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    async fn archive_all(&self, base: &Path, active: &Path) -> BackupResult<PathBuf> {
        let archive = base.join(TEMP_ARCHIVE_NAME);
        if archive.symlink_metadata().is_ok() {
            tracing::debug!("Removing leftover {}", archive.display());
            remove_path(&archive).map_err(|e| {
                BackupError::archive(format!("Failed to remove {}: {}", archive.display(), e))
            })?;
        }

        tracing::info!("Creating archive {}", archive.display());
        self.archiver
            .add(&archive, &active.join("*"), self.password, &self.options())
            .await?
            .map_err(|failure| {
                BackupError::archive(format!(
                    "Failed to create {}: {}",
                    archive.display(),
                    failure
                ))
            })?;

        StagingManager::remove(active)?;
        Ok(archive)
    }

    fn options(&self) -> [AddOption; 1] {
        [AddOption::CompressionLevel(self.compression_level)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archive::fake::FakeArchiver;
    use crate::backup::staging::ACTIVE_BACKUP_JOB;
    use std::fs;
    use tempfile::TempDir;

    fn staged(base: &Path) -> PathBuf {
        let active = StagingManager::ensure_empty(base, ACTIVE_BACKUP_JOB).unwrap();
        fs::create_dir_all(active.join("notes")).unwrap();
        fs::write(active.join("notes").join("Work.jex"), "jex").unwrap();
        fs::create_dir_all(active.join("profile")).unwrap();
        fs::write(active.join("profile").join("userstyle.css"), "css").unwrap();
        active
    }

    fn names(dir: &Path) -> Vec<String> {
        StagingManager::entries(dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_none_leaves_staging_alone() {
        let temp_dir = TempDir::new().unwrap();
        let active = staged(temp_dir.path());
        let archiver = FakeArchiver::default();

        let result = ArchiveAssembler::new(&archiver, None, 0)
            .assemble(ArchiveMode::None, temp_dir.path(), &active)
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(archiver.call_count(), 0);
        assert_eq!(names(&active), vec!["notes", "profile"]);
    }

    #[tokio::test]
    async fn test_per_item_replaces_entries_with_archives() {
        let temp_dir = TempDir::new().unwrap();
        let active = staged(temp_dir.path());
        let archiver = FakeArchiver::default();

        ArchiveAssembler::new(&archiver, Some("secret"), 5)
            .assemble(ArchiveMode::PerItem, temp_dir.path(), &active)
            .await
            .unwrap();

        assert_eq!(names(&active), vec!["notes.7z", "profile.7z"]);
        assert!(archiver
            .password_protected(&active.join("notes.7z"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_per_item_failure_keeps_staging() {
        let temp_dir = TempDir::new().unwrap();
        let active = staged(temp_dir.path());
        let archiver = FakeArchiver::failing_on("profile");

        let err = ArchiveAssembler::new(&archiver, None, 0)
            .assemble(ArchiveMode::PerItem, temp_dir.path(), &active)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Archive(_)));
        assert!(active.join("profile").join("userstyle.css").exists());
    }

    #[tokio::test]
    async fn test_single_archive() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path();
        fs::write(base.join(TEMP_ARCHIVE_NAME), "stale").unwrap();
        let active = staged(base);
        let archiver = FakeArchiver::default();

        let zip = ArchiveAssembler::new(&archiver, None, 9)
            .assemble(ArchiveMode::SingleArchive, base, &active)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(zip, base.join(TEMP_ARCHIVE_NAME));
        assert!(!active.exists());

        let listed: Vec<String> = archiver
            .list(&zip, None)
            .await
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert!(listed.contains(&"notes/Work.jex".to_string()));
        assert!(listed.contains(&"profile/userstyle.css".to_string()));
        assert!(!fs::read_to_string(&zip).unwrap().contains("stale"));
    }

    #[tokio::test]
    async fn test_single_archive_failure() {
        let temp_dir = TempDir::new().unwrap();
        let active = staged(temp_dir.path());
        let archiver = FakeArchiver::failing_on(ACTIVE_BACKUP_JOB);

        let err = ArchiveAssembler::new(&archiver, None, 0)
            .assemble(ArchiveMode::SingleArchive, temp_dir.path(), &active)
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::Archive(_)));
        assert!(active.exists());
    }
}
