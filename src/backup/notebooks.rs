//! Notebook export
//!
//! Drives the external [`NoteExporter`]: collects the top-level containers
//! that hold notes and exports them either all together or one file (or
//! directory) per container.

use std::path::{Path, PathBuf};

use crate::backup::naming::{sanitize_file_name, unique_destination};
use crate::config::settings::ExportFormat;
use crate::error::{BackupError, BackupResult};
use crate::export::{Container, NoteExporter};

/// Base name of the combined export
pub const ALL_NOTEBOOKS: &str = "all_notebooks";

/// Staging subdirectory for per-notebook exports
pub const NOTES_DIR: &str = "notes";

/// Exports notebooks into the staging area
pub struct NotebookExport<'a> {
    exporter: &'a dyn NoteExporter,
    format: ExportFormat,
}

impl<'a> NotebookExport<'a> {
    pub fn new(exporter: &'a dyn NoteExporter, format: ExportFormat) -> Self {
        Self { exporter, format }
    }

    /// Export into `active`, returning the written paths
    pub async fn run(&self, active: &Path, single: bool) -> BackupResult<Vec<PathBuf>> {
        let notebooks = self.top_level_with_content().await?;
        if notebooks.is_empty() {
            return Err(BackupError::export("No notebooks with notes found"));
        }

        if single {
            let dest = active.join(self.format.target_name(ALL_NOTEBOOKS));
            let ids: Vec<String> = notebooks.into_iter().map(|c| c.id).collect();
            tracing::info!("Exporting {} notebook(s) to {}", ids.len(), dest.display());
            self.exporter.export_items(&ids, self.format, &dest).await?;
            return Ok(vec![dest]);
        }

        let notes_dir = active.join(NOTES_DIR);
        std::fs::create_dir_all(&notes_dir).map_err(|e| {
            BackupError::export(format!("Failed to create {}: {}", notes_dir.display(), e))
        })?;

        let mut written = Vec::with_capacity(notebooks.len());
        for notebook in notebooks {
            let name = self.format.target_name(&sanitize_file_name(&notebook.title));
            let dest = unique_destination(&notes_dir.join(name), self.format == ExportFormat::Jex);
            tracing::info!("Exporting notebook '{}' to {}", notebook.title, dest.display());
            self.exporter
                .export_items(std::slice::from_ref(&notebook.id), self.format, &dest)
                .await?;
            written.push(dest);
        }
        Ok(written)
    }

    async fn top_level_with_content(&self) -> BackupResult<Vec<Container>> {
        let mut result = Vec::new();
        let mut page = 1;
        loop {
            let listing = self.exporter.list_containers(page).await?;
            for container in listing.items {
                if !container.is_top_level() {
                    continue;
                }
                if self.exporter.has_content(&container.id).await? {
                    result.push(container);
                } else {
                    tracing::debug!("Skipping empty notebook '{}'", container.title);
                }
            }
            if !listing.has_more {
                break;
            }
            page += 1;
        }
        Ok(result)
    }
}
