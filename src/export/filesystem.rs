//! Note exporter over a directory tree
//!
//! Every directory below the notes directory is a container; its path
//! relative to the notes directory (with `/` separators) is the container
//! id. Files are notes. Hidden entries are ignored.
//!
//! `raw` exports copy the container directories. A single container is
//! copied straight into the destination, several each get a subdirectory. `jex` exports write a single
//! JSON bundle mapping each note's relative path to its text; notes that are
//! not valid UTF-8 are left out with a warning.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Container, NoteExporter, Page};
use crate::config::settings::ExportFormat;
use crate::error::{BackupError, BackupResult};
use crate::storage::file_io::copy_recursive;

/// Containers returned per page
pub const PAGE_SIZE: usize = 50;

const BUNDLE_FORMAT: &str = "notes-backup-jex";

/// Single-file export written for [`ExportFormat::Jex`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JexBundle {
    pub format: String,
    pub version: u32,
    /// Relative note path to note text
    pub notes: BTreeMap<String, String>,
}

/// Exports notes stored as files under a root directory
#[derive(Debug, Clone)]
pub struct FsNoteExporter {
    root: PathBuf,
}

impl FsNoteExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_path(&self, id: &str) -> PathBuf {
        id.split('/').fold(self.root.clone(), |path, part| path.join(part))
    }

    fn all_containers(&self) -> BackupResult<Vec<Container>> {
        if !self.root.is_dir() {
            return Err(BackupError::export(format!(
                "Notes directory {} does not exist",
                self.root.display()
            )));
        }
        let mut containers = Vec::new();
        collect_containers(&self.root, "", &mut containers)?;
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(containers)
    }

    fn write_bundle(&self, ids: &[String], dest: &Path) -> BackupResult<()> {
        let mut notes = BTreeMap::new();
        for id in ids {
            let path = self.container_path(id);
            collect_notes(&path, id, &mut notes)?;
        }

        let bundle = JexBundle {
            format: BUNDLE_FORMAT.to_string(),
            version: 1,
            notes,
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&bundle)?;
        fs::write(dest, json).map_err(|e| {
            BackupError::export(format!("Failed to write {}: {}", dest.display(), e))
        })
    }

    fn copy_tree(&self, ids: &[String], dest: &Path) -> BackupResult<()> {
        fs::create_dir_all(dest).map_err(|e| {
            BackupError::export(format!("Failed to create {}: {}", dest.display(), e))
        })?;
        if let [id] = ids {
            return copy_recursive(&self.container_path(id), dest)
                .map_err(|e| BackupError::export(format!("Failed to export '{}': {}", id, e)));
        }
        for id in ids {
            let src = self.container_path(id);
            let name = id.rsplit('/').next().unwrap_or(id.as_str());
            copy_recursive(&src, &dest.join(name))
                .map_err(|e| BackupError::export(format!("Failed to export '{}': {}", id, e)))?;
        }
        Ok(())
    }
}

#[async_trait]
impl NoteExporter for FsNoteExporter {
    async fn export_items(
        &self,
        ids: &[String],
        format: ExportFormat,
        dest: &Path,
    ) -> BackupResult<()> {
        if let Some(missing) = ids.iter().find(|id| !self.container_path(id).is_dir()) {
            return Err(BackupError::export(format!("Unknown container '{}'", missing)));
        }

        tracing::debug!("Exporting {} container(s) as {} to {}", ids.len(), format, dest.display());
        match format {
            ExportFormat::Jex => self.write_bundle(ids, dest),
            ExportFormat::Raw => self.copy_tree(ids, dest),
        }
    }

    async fn list_containers(&self, page: u32) -> BackupResult<Page<Container>> {
        let containers = self.all_containers()?;
        let start = (page.max(1) as usize - 1) * PAGE_SIZE;
        let items: Vec<Container> = containers.iter().skip(start).take(PAGE_SIZE).cloned().collect();
        Ok(Page {
            has_more: start + items.len() < containers.len(),
            items,
        })
    }

    async fn has_content(&self, container_id: &str) -> BackupResult<bool> {
        has_files(&self.container_path(container_id))
    }

    async fn last_change(&self) -> BackupResult<i64> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        latest_modification(&self.root)
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn visible_entries(dir: &Path) -> BackupResult<Vec<fs::DirEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)
        .map_err(|e| BackupError::export(format!("Failed to read {}: {}", dir.display(), e)))?
    {
        let entry = entry?;
        if !is_hidden(&entry.file_name().to_string_lossy()) {
            entries.push(entry);
        }
    }
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn collect_containers(dir: &Path, parent_id: &str, out: &mut Vec<Container>) -> BackupResult<()> {
    for entry in visible_entries(dir)? {
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let title = entry.file_name().to_string_lossy().to_string();
        let id = if parent_id.is_empty() {
            title.clone()
        } else {
            format!("{}/{}", parent_id, title)
        };
        out.push(Container {
            id: id.clone(),
            title,
            parent_id: parent_id.to_string(),
        });
        collect_containers(&entry.path(), &id, out)?;
    }
    Ok(())
}

fn collect_notes(dir: &Path, prefix: &str, out: &mut BTreeMap<String, String>) -> BackupResult<()> {
    for entry in visible_entries(dir)? {
        let name = format!("{}/{}", prefix, entry.file_name().to_string_lossy());
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_notes(&path, &name, out)?;
            continue;
        }
        match fs::read(&path).map(String::from_utf8) {
            Ok(Ok(text)) => {
                out.insert(name, text);
            }
            Ok(Err(_)) => tracing::warn!("Skipping {}: not a text note", path.display()),
            Err(e) => {
                return Err(BackupError::export(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
    Ok(())
}

fn has_files(dir: &Path) -> BackupResult<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in visible_entries(dir)? {
        if !entry.file_type()?.is_dir() || has_files(&entry.path())? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn latest_modification(dir: &Path) -> BackupResult<i64> {
    let mut latest = 0;
    for entry in visible_entries(dir)? {
        let metadata = entry.metadata()?;
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        latest = latest.max(modified);
        if metadata.is_dir() {
            latest = latest.max(latest_modification(&entry.path())?);
        }
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn notes_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("Work").join("Meetings")).unwrap();
        fs::write(root.join("Work").join("todo.md"), "# Todo").unwrap();
        fs::write(root.join("Work").join("Meetings").join("monday.md"), "notes").unwrap();
        fs::create_dir_all(root.join("Empty").join("Nested")).unwrap();
        fs::create_dir_all(root.join(".trash")).unwrap();
        temp_dir
    }

    #[tokio::test]
    async fn test_list_containers() {
        let temp_dir = notes_tree();
        let exporter = FsNoteExporter::new(temp_dir.path());

        let page = exporter.list_containers(1).await.unwrap();
        assert!(!page.has_more);
        let ids: Vec<&str> = page.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Empty", "Empty/Nested", "Work", "Work/Meetings"]);
        assert!(page.items[0].is_top_level());
        assert_eq!(page.items[3].parent_id, "Work");
        assert!(exporter.list_containers(2).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_pagination() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..PAGE_SIZE + 3 {
            fs::create_dir_all(temp_dir.path().join(format!("nb{:03}", i))).unwrap();
        }
        let exporter = FsNoteExporter::new(temp_dir.path());

        let first = exporter.list_containers(1).await.unwrap();
        assert_eq!(first.items.len(), PAGE_SIZE);
        assert!(first.has_more);
        let second = exporter.list_containers(2).await.unwrap();
        assert_eq!(second.items.len(), 3);
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn test_has_content() {
        let temp_dir = notes_tree();
        let exporter = FsNoteExporter::new(temp_dir.path());
        assert!(exporter.has_content("Work").await.unwrap());
        assert!(!exporter.has_content("Empty").await.unwrap());
        assert!(!exporter.has_content("Missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_export_jex_bundle() {
        let temp_dir = notes_tree();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("Work.jex");
        let exporter = FsNoteExporter::new(temp_dir.path());

        exporter
            .export_items(&["Work".to_string()], ExportFormat::Jex, &dest)
            .await
            .unwrap();

        let bundle: JexBundle = serde_json::from_str(&fs::read_to_string(&dest).unwrap()).unwrap();
        assert_eq!(bundle.format, BUNDLE_FORMAT);
        assert_eq!(bundle.notes["Work/todo.md"], "# Todo");
        assert_eq!(bundle.notes["Work/Meetings/monday.md"], "notes");
    }

    #[tokio::test]
    async fn test_export_raw() {
        let temp_dir = notes_tree();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("all_notebooks");
        let exporter = FsNoteExporter::new(temp_dir.path());

        exporter
            .export_items(&["Work".to_string(), "Empty".to_string()], ExportFormat::Raw, &dest)
            .await
            .unwrap();

        assert!(dest.join("Work").join("Meetings").join("monday.md").is_file());
        assert!(dest.join("Empty").join("Nested").is_dir());
    }

    #[tokio::test]
    async fn test_export_raw_single_container_is_not_nested() {
        let temp_dir = notes_tree();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("Work");
        let exporter = FsNoteExporter::new(temp_dir.path());

        exporter
            .export_items(&["Work".to_string()], ExportFormat::Raw, &dest)
            .await
            .unwrap();

        assert!(dest.join("Meetings").join("monday.md").is_file());
        assert!(!dest.join("Work").exists());
    }

    #[tokio::test]
    async fn test_export_unknown_container() {
        let temp_dir = notes_tree();
        let exporter = FsNoteExporter::new(temp_dir.path());
        let err = exporter
            .export_items(&["Nope".to_string()], ExportFormat::Raw, temp_dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Export(_)));
    }

    #[tokio::test]
    async fn test_last_change() {
        let temp_dir = notes_tree();
        let exporter = FsNoteExporter::new(temp_dir.path());
        assert!(exporter.last_change().await.unwrap() > 0);

        let missing = FsNoteExporter::new(temp_dir.path().join("missing"));
        assert_eq!(missing.last_change().await.unwrap(), 0);
    }
}
