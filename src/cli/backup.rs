//! Backup CLI commands
//!
//! `run`, `daemon`, `list` and `prune`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{Local, TimeZone};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::backup::{BackupIndexStore, BackupPipeline, RetentionPruner, RunReport, SevenZip};
use crate::config::paths::{home_dir, resolve_backup_root};
use crate::config::settings::{keys, load_retention, BackupLocation};
use crate::config::store::{global_string, JsonFileStore, SettingsStore};
use crate::error::{BackupError, BackupResult};
use crate::export::{ConsoleNotifier, FsNoteExporter};
use crate::logging::RunLogHandle;

/// How often the daemon looks for edits to the settings file
const SETTINGS_POLL: Duration = Duration::from_secs(30);

#[derive(Tabled)]
struct BackupSetRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "On disk")]
    on_disk: String,
}

/// Wire the pipeline to the file-backed collaborators
pub fn build_pipeline(
    store: Arc<JsonFileStore>,
    run_log: RunLogHandle,
    quiet: bool,
) -> BackupResult<Arc<BackupPipeline>> {
    let notes_dir = global_string(&*store, keys::GLOBAL_NOTES_DIR)?.ok_or_else(|| {
        BackupError::config(
            "The notes directory is not configured (notes-backup config set-global notesDir <DIR>)",
        )
    })?;

    let seven_zip_path = global_string(&*store, keys::GLOBAL_SEVEN_ZIP_PATH)?;
    let installation_dir = global_string(&*store, keys::GLOBAL_INSTALLATION_DIR)?;
    let archiver = SevenZip::resolve(
        seven_zip_path.as_deref().map(Path::new),
        installation_dir.as_deref().map(Path::new),
    );
    tracing::debug!("Using 7-Zip at {}", archiver.binary().display());

    let pipeline = BackupPipeline::new(
        store,
        Arc::new(FsNoteExporter::new(notes_dir)),
        Arc::new(archiver),
        Arc::new(ConsoleNotifier::new(quiet)),
    )
    .with_run_log(run_log);

    Ok(Arc::new(pipeline))
}

/// Perform one interactive backup
///
/// Failures have already been reported through the notifier when this
/// returns an error.
pub async fn handle_run(pipeline: &Arc<BackupPipeline>) -> BackupResult<RunReport> {
    println!("Creating backup...");
    let result = pipeline.run(true).await;
    pipeline.stop_timer();

    let report = result?;
    println!("Location: {}", report.destination.display());
    for name in &report.pruned {
        println!("Removed old backup set: {}", name);
    }
    Ok(report)
}

/// Run the periodic trigger until Ctrl-C
pub async fn handle_daemon(
    pipeline: &Arc<BackupPipeline>,
    settings_file: &Path,
) -> BackupResult<()> {
    pipeline.start();
    println!("Automatic backups armed. Press Ctrl-C to stop.");

    let mut last_modified = modified(settings_file);
    let mut poll = tokio::time::interval(SETTINGS_POLL);
    poll.tick().await;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| BackupError::Io(format!("Failed to wait for Ctrl-C: {}", e)))?;
                break;
            }
            _ = poll.tick() => {
                let current = modified(settings_file);
                if current != last_modified {
                    tracing::info!("Settings changed, restarting the backup timer");
                    last_modified = current;
                    pipeline.settings_changed();
                }
            }
        }
    }

    pipeline.stop_timer();
    println!("Stopped.");
    Ok(())
}

/// Show the backup index
pub fn handle_list(store: &JsonFileStore) -> BackupResult<()> {
    let entries = BackupIndexStore::new(store).load()?;
    if entries.is_empty() {
        println!("No backups found.");
        println!("Retained backup sets are recorded when backupRetention is above 1.");
        return Ok(());
    }

    let root = backup_root(store).ok();
    let mut entries = entries;
    entries.sort_by(|a, b| b.date.cmp(&a.date));

    let rows: Vec<BackupSetRow> = entries
        .iter()
        .map(|entry| BackupSetRow {
            name: entry.name.clone(),
            created: format_date(entry.date),
            on_disk: match &root {
                Some(root) if entry.exists_in(root) => "yes".into(),
                Some(_) => "missing".into(),
                None => "?".into(),
            },
        })
        .collect();

    println!("Backup Sets");
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    if let Some(root) = root {
        println!("Backup root: {}", root.display());
    }
    Ok(())
}

/// Apply the retention policy without taking a backup
pub fn handle_prune(store: &JsonFileStore) -> BackupResult<()> {
    let (retention, warning) = load_retention(store)?;
    if let Some(warning) = warning {
        eprintln!("Warning: {}", warning);
    }
    let root = backup_root(store)?;
    if !root.is_dir() {
        return Err(BackupError::BackupPathMissing(root));
    }

    let removed = RetentionPruner::new(BackupIndexStore::new(store)).prune(&root, retention)?;
    if removed.is_empty() {
        println!("Nothing to prune (keeping {}).", retention);
    } else {
        for name in &removed {
            println!("Removed: {}", name);
        }
        println!("Pruned {} backup set(s).", removed.len());
    }
    Ok(())
}

/// Resolve the backup root from the stored location, without writing
fn backup_root(store: &dyn SettingsStore) -> BackupResult<PathBuf> {
    let location = BackupLocation::load(store)?;
    let profile_dir = global_string(store, keys::GLOBAL_PROFILE_DIR)?
        .map(PathBuf::from)
        .ok_or_else(|| BackupError::config("The profile directory is not known"))?;
    let resolved = resolve_backup_root(
        &location.path,
        &profile_dir,
        home_dir().as_deref(),
        location.create_subfolder,
    )?;
    Ok(resolved.path)
}

fn format_date(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(date) => date.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => millis.to_string(),
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
