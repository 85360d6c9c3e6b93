//! File I/O utilities with atomic writes
//!
//! Provides the filesystem primitives the backup pipeline is built from:
//! atomic JSON writes, recursive copies, moves that survive crossing volumes,
//! and removal of either a file or a directory tree.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::BackupError;

/// Read JSON from a file, returning a default value if file doesn't exist
pub fn read_json<T, P>(path: P) -> Result<T, BackupError>
where
    T: DeserializeOwned + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(T::default());
    }

    let file = File::open(path)
        .map_err(|e| BackupError::Settings(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|e| BackupError::Settings(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically (write to temp, then rename)
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), BackupError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BackupError::Settings(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Same directory, so the rename stays on one filesystem
    let temp_path = path.with_extension("json.tmp");

    let file = File::create(&temp_path)
        .map_err(|e| BackupError::Settings(format!("Failed to create temp file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, data)
        .map_err(|e| BackupError::Settings(format!("Failed to serialize data: {}", e)))?;

    writer
        .flush()
        .map_err(|e| BackupError::Settings(format!("Failed to flush data: {}", e)))?;

    writer
        .get_ref()
        .sync_all()
        .map_err(|e| BackupError::Settings(format!("Failed to sync data: {}", e)))?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        BackupError::Settings(format!("Failed to rename temp file: {}", e))
    })?;

    Ok(())
}

/// Copy a single file if the source exists
///
/// Returns `Ok(false)` without touching the destination when `src` is missing,
/// `Ok(true)` once `dst` holds a copy of `src`.
pub fn backup_file<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<bool, BackupError> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if !src.is_file() {
        tracing::debug!("No file '{}' to back up", src.display());
        return Ok(false);
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::copy(src, dst).map_err(|e| {
        BackupError::Io(format!(
            "Failed to copy {} to {}: {}",
            src.display(),
            dst.display(),
            e
        ))
    })?;

    Ok(true)
}

/// Copy a directory tree if the source exists
///
/// Same contract as [`backup_file`], for directories.
pub fn backup_folder<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<bool, BackupError> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if !src.is_dir() {
        tracing::debug!("No folder '{}' to back up", src.display());
        return Ok(false);
    }

    copy_recursive(src, dst)?;
    Ok(true)
}

/// Recursively copy `src` (file or directory) to `dst`
pub fn copy_recursive(src: &Path, dst: &Path) -> Result<(), BackupError> {
    let metadata = fs::metadata(src)
        .map_err(|e| BackupError::Io(format!("Failed to stat {}: {}", src.display(), e)))?;

    if metadata.is_file() {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst).map_err(|e| {
            BackupError::Io(format!(
                "Failed to copy {} to {}: {}",
                src.display(),
                dst.display(),
                e
            ))
        })?;
        return Ok(());
    }

    fs::create_dir_all(dst)
        .map_err(|e| BackupError::Io(format!("Failed to create {}: {}", dst.display(), e)))?;

    for entry in fs::read_dir(src)
        .map_err(|e| BackupError::Io(format!("Failed to read {}: {}", src.display(), e)))?
    {
        let entry = entry?;
        copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
    }

    Ok(())
}

/// Remove a file or a directory tree
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Move `src` to `dst`
///
/// Tries a rename first. When that fails (typically because the two paths are
/// on different volumes) the source is copied and then removed. A partial copy
/// is cleaned up and the original rename error is returned if the copy fails,
/// so `src` is never removed unless `dst` is complete.
pub fn move_path(src: &Path, dst: &Path) -> std::io::Result<()> {
    let rename_err = match fs::rename(src, dst) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };

    if !src.exists() {
        return Err(rename_err);
    }

    tracing::debug!(
        "Rename {} -> {} failed ({}), falling back to copy",
        src.display(),
        dst.display(),
        rename_err
    );

    if copy_recursive(src, dst).is_err() {
        if dst.exists() {
            let _ = remove_path(dst);
        }
        return Err(rename_err);
    }

    remove_path(src)
}

/// Move `src` to `dst`, replacing whatever is at `dst`
pub fn move_overwrite(src: &Path, dst: &Path) -> std::io::Result<()> {
    if dst.symlink_metadata().is_ok() {
        remove_path(dst)?;
    }
    move_path(src, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_read_nonexistent_returns_default() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        let data: TestData = read_json(&path).unwrap();
        assert_eq!(data, TestData::default());
    }

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("test.json");

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };

        write_json_atomic(&path, &data).unwrap();
        assert!(!temp_dir.path().join("nested").join("test.json.tmp").exists());

        let loaded: TestData = read_json(&path).unwrap();
        assert_eq!(data, loaded);
    }

    #[test]
    fn test_backup_file() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("profile").join("settings.json");
        let missing = temp_dir.path().join("profile").join("doesNotExist.json");
        let dst = temp_dir.path().join("backup").join("settings.json");
        fs::create_dir_all(src.parent().unwrap()).unwrap();
        fs::write(&src, "data").unwrap();

        assert!(backup_file(&src, &dst).unwrap());
        assert_eq!(fs::read_to_string(&dst).unwrap(), "data");

        let other_dst = temp_dir.path().join("backup").join("other.json");
        assert!(!backup_file(&missing, &other_dst).unwrap());
        assert!(!other_dst.exists());
    }

    #[test]
    fn test_backup_folder_copies_tree() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("templates");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.md"), "a").unwrap();
        fs::write(src.join("sub").join("b.md"), "b").unwrap();

        let dst = temp_dir.path().join("out").join("templates");
        assert!(backup_folder(&src, &dst).unwrap());
        assert_eq!(fs::read_to_string(dst.join("sub").join("b.md")).unwrap(), "b");

        assert!(!backup_folder(temp_dir.path().join("nope"), temp_dir.path().join("x")).unwrap());
        assert!(!temp_dir.path().join("x").exists());
    }

    #[test]
    fn test_move_path_directory() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("file.txt"), "x").unwrap();
        let dst = temp_dir.path().join("dst");

        move_path(&src, &dst).unwrap();
        assert!(!src.exists());
        assert!(dst.join("file.txt").exists());
    }

    #[test]
    fn test_move_overwrite_replaces_directory() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("new");
        let dst = temp_dir.path().join("old");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("fresh.txt"), "new").unwrap();
        fs::write(dst.join("stale.txt"), "old").unwrap();

        move_overwrite(&src, &dst).unwrap();
        assert!(dst.join("fresh.txt").exists());
        assert!(!dst.join("stale.txt").exists());
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = move_path(&temp_dir.path().join("a"), &temp_dir.path().join("b"));
        assert!(result.is_err());
    }
}
